//! Userinfo retrieval.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::error::{LoginError, Result};

/// Placeholder shown for absent claims.
pub const MISSING_CLAIM: &str = "N/A";

/// Claims returned by the userinfo endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile {
    claims: Map<String, Value>,
}

impl UserProfile {
    /// Parse a userinfo body. The body must be a JSON object.
    pub fn from_body(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| LoginError::invalid_response("userinfo endpoint", e.to_string()))?;
        match value {
            Value::Object(claims) => Ok(Self { claims }),
            other => Err(LoginError::invalid_response(
                "userinfo endpoint",
                format!("expected a JSON object, got {}", json_kind(&other)),
            )),
        }
    }

    /// All claims.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// A single claim.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// A claim rendered for display, or `N/A` when absent or null.
    pub fn display_claim(&self, name: &str) -> String {
        match self.claims.get(name) {
            None | Some(Value::Null) => MISSING_CLAIM.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Subject identifier (`sub`).
    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    /// Pretty-printed JSON document.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.claims).unwrap_or_else(|_| "{}".to_string())
    }
}

impl From<Map<String, Value>> for UserProfile {
    fn from(claims: Map<String, Value>) -> Self {
        Self { claims }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fetch the profile of the user owning `access_token`.
pub async fn fetch_user_info(
    client: &Client,
    config: &ClientConfig,
    access_token: &str,
) -> Result<UserProfile> {
    debug!(userinfo_url = config.userinfo_url(), "Fetching user info");
    let response = client
        .get(config.userinfo_url())
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if status != StatusCode::OK {
        error!(status = status.as_u16(), "User info request failed");
        return Err(LoginError::UserInfoFailed {
            status: status.as_u16(),
            body,
        });
    }

    let profile = UserProfile::from_body(&body)?;
    info!(claims = profile.claims().len(), "User info received");
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ClientConfig {
        ClientConfig::new("client-1", "secret-1")
            .with_userinfo_url(format!("{}/o/userinfo/", server.uri()))
    }

    #[tokio::test]
    async fn test_fetch_user_info_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/o/userinfo/"))
            .and(header("authorization", "Bearer abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "42",
                "name": "Ada",
                "email": "ada@example.com",
                "groups": ["admins"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = fetch_user_info(&Client::new(), &config(&server), "abc123")
            .await
            .unwrap();

        assert_eq!(profile.subject(), Some("42"));
        assert_eq!(profile.display_claim("name"), "Ada");
        assert_eq!(profile.get("groups"), Some(&json!(["admins"])));
    }

    #[tokio::test]
    async fn test_fetch_user_info_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_token"))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_user_info(&Client::new(), &config(&server), "expired")
            .await
            .unwrap_err();

        match err {
            LoginError::UserInfoFailed { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid_token");
            }
            other => panic!("Expected UserInfoFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_body_is_a_transport_error() {
        let base = crate::test_support::truncated_body_server().await;
        let config = ClientConfig::new("client-1", "secret-1")
            .with_userinfo_url(format!("{}/o/userinfo/", base));

        let err = fetch_user_info(&Client::new(), &config, "abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::Http(_)), "{:?}", err);
    }

    #[test]
    fn test_display_claim() {
        let profile = UserProfile::from_body(
            r#"{"sub": 42, "name": "Ada", "role": null, "admin": true}"#,
        )
        .unwrap();

        assert_eq!(profile.display_claim("sub"), "42");
        assert_eq!(profile.display_claim("name"), "Ada");
        assert_eq!(profile.display_claim("role"), "N/A");
        assert_eq!(profile.display_claim("email"), "N/A");
        assert_eq!(profile.display_claim("admin"), "true");
        assert_eq!(profile.subject(), None);
    }

    #[test]
    fn test_non_object_body() {
        let err = UserProfile::from_body("[1, 2]").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid response from userinfo endpoint: expected a JSON object, got an array"
        );
    }
}
