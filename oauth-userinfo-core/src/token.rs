//! Authorization code exchange.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::context::FlowContext;
use crate::error::{LoginError, Result};

/// Token response from the token endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .finish()
    }
}

impl TokenResponse {
    /// Parse a token endpoint body.
    ///
    /// Only a non-empty string `access_token` is required. Metadata fields
    /// with an unexpected shape are dropped rather than rejected.
    pub fn from_body(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| LoginError::invalid_response("token endpoint", e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(LoginError::invalid_response(
                "token endpoint",
                "expected a JSON object",
            ));
        };

        let access_token = string_field(&fields, "access_token").ok_or(LoginError::TokenMissing)?;

        Ok(Self {
            access_token,
            token_type: string_field(&fields, "token_type"),
            expires_in: fields.get("expires_in").and_then(lenient_u64),
            scope: fields.get("scope").and_then(scope_string),
            refresh_token: string_field(&fields, "refresh_token"),
            id_token: string_field(&fields, "id_token"),
        })
    }
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A number, or a string holding one.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A space-separated string, or an array of scope strings.
fn scope_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let scopes: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!scopes.is_empty()).then(|| scopes.join(" "))
        }
        _ => None,
    }
}

/// Exchange an authorization code for tokens.
///
/// Sends a form-encoded `authorization_code` grant to the token endpoint.
/// Anything but HTTP 200 is [`LoginError::TokenExchangeFailed`]; there is no
/// retry.
pub async fn exchange_code(
    client: &Client,
    config: &ClientConfig,
    context: &FlowContext,
    code: &str,
) -> Result<TokenResponse> {
    let mut params = vec![
        ("client_id", config.client_id()),
        ("client_secret", config.client_secret()),
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", context.redirect_uri.as_str()),
    ];
    if let Some(verifier) = context.code_verifier() {
        params.push(("code_verifier", verifier));
    }

    debug!(token_url = config.token_url(), "Exchanging authorization code");
    let response = client
        .post(config.token_url())
        .header("Accept", "application/json")
        .form(&params)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if status != StatusCode::OK {
        error!(status = status.as_u16(), "Token request failed");
        return Err(LoginError::TokenExchangeFailed {
            status: status.as_u16(),
            body,
        });
    }

    let tokens = TokenResponse::from_body(&body)?;
    info!(
        token_type = tokens.token_type.as_deref().unwrap_or("unknown"),
        expires_in = tokens.expires_in,
        "Access token received"
    );
    Ok(tokens)
}
