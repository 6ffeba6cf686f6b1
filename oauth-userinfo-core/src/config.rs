//! Client configuration.
//!
//! A [`ClientConfig`] is assembled once at startup (defaults, then environment,
//! then explicit overrides) and only read afterwards.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{LoginError, Result};

/// Default authorization endpoint.
pub const DEFAULT_AUTH_URL: &str = "https://pramari.de/o/authorize/";
/// Default token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://pramari.de/o/token/";
/// Default userinfo endpoint.
pub const DEFAULT_USERINFO_URL: &str = "https://pramari.de/o/userinfo/";
/// Default redirect URI registered with the provider.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/callback";
/// Default requested scopes.
pub const DEFAULT_SCOPES: &str = "openid email userinfo";
/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "OAUTH_USERINFO";

const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
const DEFAULT_LISTEN_PORT: u16 = 8000;
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Configuration for the OAuth client and the local callback listener.
#[derive(Clone)]
pub struct ClientConfig {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    scopes: Vec<String>,
    listen_host: String,
    listen_port: Option<u16>,
    callback_timeout: Duration,
    http_timeout: Duration,
    use_pkce: bool,
}

impl ClientConfig {
    /// Create a configuration with the default provider endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            userinfo_url: DEFAULT_USERINFO_URL.to_string(),
            scopes: split_scopes(DEFAULT_SCOPES),
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            listen_port: None,
            callback_timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            use_pkce: false,
        }
    }

    /// Load from environment variables with the given prefix.
    ///
    /// Looks for:
    /// - `{PREFIX}_CLIENT_ID` (required)
    /// - `{PREFIX}_CLIENT_SECRET` (required)
    /// - `{PREFIX}_REDIRECT_URI`
    /// - `{PREFIX}_AUTH_URL`, `{PREFIX}_TOKEN_URL`, `{PREFIX}_USERINFO_URL`
    /// - `{PREFIX}_SCOPES`
    /// - `{PREFIX}_LISTEN_HOST`, `{PREFIX}_PORT`
    /// - `{PREFIX}_CALLBACK_TIMEOUT_SECS`, `{PREFIX}_HTTP_TIMEOUT_SECS`
    /// - `{PREFIX}_USE_PKCE`
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}_{}", prefix, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let client_id = var("CLIENT_ID").ok_or(LoginError::MissingConfig("CLIENT_ID"))?;
        let client_secret =
            var("CLIENT_SECRET").ok_or(LoginError::MissingConfig("CLIENT_SECRET"))?;

        let mut config = Self::new(client_id, client_secret);

        if let Some(v) = var("REDIRECT_URI") {
            config = config.with_redirect_uri(v);
        }
        if let Some(v) = var("AUTH_URL") {
            config = config.with_auth_url(v);
        }
        if let Some(v) = var("TOKEN_URL") {
            config = config.with_token_url(v);
        }
        if let Some(v) = var("USERINFO_URL") {
            config = config.with_userinfo_url(v);
        }
        if let Some(v) = var("SCOPES") {
            config = config.with_scopes(&v);
        }
        if let Some(v) = var("LISTEN_HOST") {
            config = config.with_listen_host(v);
        }
        if let Some(v) = var("PORT") {
            config = config.with_listen_port(parse_number("PORT", &v)?);
        }
        if let Some(v) = var("CALLBACK_TIMEOUT_SECS") {
            config = config.with_callback_timeout(Duration::from_secs(parse_number(
                "CALLBACK_TIMEOUT_SECS",
                &v,
            )?));
        }
        if let Some(v) = var("HTTP_TIMEOUT_SECS") {
            config = config.with_http_timeout(Duration::from_secs(parse_number(
                "HTTP_TIMEOUT_SECS",
                &v,
            )?));
        }
        if let Some(v) = var("USE_PKCE") {
            config = config.with_pkce(parse_bool("USE_PKCE", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Set the authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    /// Set the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Set the userinfo endpoint.
    #[must_use]
    pub fn with_userinfo_url(mut self, url: impl Into<String>) -> Self {
        self.userinfo_url = url.into();
        self
    }

    /// Set requested scopes (space or comma separated).
    #[must_use]
    pub fn with_scopes(mut self, scopes: &str) -> Self {
        self.scopes = split_scopes(scopes);
        self
    }

    /// Set the host the callback listener binds.
    #[must_use]
    pub fn with_listen_host(mut self, host: impl Into<String>) -> Self {
        self.listen_host = host.into();
        self
    }

    /// Set the callback listener port. `0` picks an ephemeral port.
    #[must_use]
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Set how long to wait for the callback.
    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Set the timeout for outbound HTTP calls.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Enable or disable PKCE (S256).
    #[must_use]
    pub fn with_pkce(mut self, enabled: bool) -> Self {
        self.use_pkce = enabled;
        self
    }

    /// Check that every URL parses and required values are present.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(LoginError::MissingConfig("CLIENT_ID"));
        }
        if self.client_secret.is_empty() {
            return Err(LoginError::MissingConfig("CLIENT_SECRET"));
        }
        for (name, value) in [
            ("REDIRECT_URI", &self.redirect_uri),
            ("AUTH_URL", &self.auth_url),
            ("TOKEN_URL", &self.token_url),
            ("USERINFO_URL", &self.userinfo_url),
        ] {
            parse_url(name, value)?;
        }
        if self.scopes.is_empty() {
            return Err(LoginError::InvalidConfig("SCOPES is empty".to_string()));
        }
        if self.callback_timeout.is_zero() {
            return Err(LoginError::InvalidConfig(
                "CALLBACK_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// OAuth client ID.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OAuth client secret.
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Configured redirect URI.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Authorization endpoint.
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Token endpoint.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Userinfo endpoint.
    pub fn userinfo_url(&self) -> &str {
        &self.userinfo_url
    }

    /// Requested scopes.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Scopes as the space-separated `scope` parameter.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// Host the callback listener binds.
    pub fn listen_host(&self) -> &str {
        &self.listen_host
    }

    /// Port the callback listener binds.
    ///
    /// Falls back to the redirect URI's port, then 8000.
    pub fn listen_port(&self) -> u16 {
        self.listen_port.unwrap_or_else(|| {
            Url::parse(&self.redirect_uri)
                .ok()
                .and_then(|u| u.port_or_known_default())
                .unwrap_or(DEFAULT_LISTEN_PORT)
        })
    }

    /// How long to wait for the callback.
    pub fn callback_timeout(&self) -> Duration {
        self.callback_timeout
    }

    /// Timeout for outbound HTTP calls.
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Whether PKCE is enabled.
    pub fn use_pkce(&self) -> bool {
        self.use_pkce
    }

    /// Redirect URI to send for a listener bound on `port`.
    ///
    /// The configured value is used verbatim when its port already matches, so
    /// it compares equal to the URI registered with the provider.
    pub fn effective_redirect_uri(&self, port: u16) -> Result<String> {
        let url = parse_url("REDIRECT_URI", &self.redirect_uri)?;
        if url.port_or_known_default() == Some(port) {
            return Ok(self.redirect_uri.clone());
        }
        self.redirect_uri_for_port(port)
    }

    /// Redirect URI rewritten to carry the port actually bound.
    pub fn redirect_uri_for_port(&self, port: u16) -> Result<String> {
        let mut url = parse_url("REDIRECT_URI", &self.redirect_uri)?;
        url.set_port(Some(port)).map_err(|_| {
            LoginError::InvalidConfig(format!(
                "REDIRECT_URI cannot carry a port: {}",
                self.redirect_uri
            ))
        })?;
        Ok(url.to_string())
    }

    /// Build an HTTP client for the token and userinfo calls.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()?;
        Ok(client)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("scopes", &self.scopes)
            .field("listen_host", &self.listen_host)
            .field("listen_port", &self.listen_port)
            .field("callback_timeout", &self.callback_timeout)
            .field("http_timeout", &self.http_timeout)
            .field("use_pkce", &self.use_pkce)
            .finish()
    }
}

pub(crate) fn parse_url(name: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| LoginError::InvalidConfig(format!("{} '{}': {}", name, value, e)))
}

fn split_scopes(scopes: &str) -> Vec<String> {
    scopes
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| LoginError::InvalidConfig(format!("{} is not a valid number: {}", name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(LoginError::InvalidConfig(format!(
            "{} is not a valid boolean: {}",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("id", "secret");
        assert_eq!(config.auth_url(), DEFAULT_AUTH_URL);
        assert_eq!(config.token_url(), DEFAULT_TOKEN_URL);
        assert_eq!(config.userinfo_url(), DEFAULT_USERINFO_URL);
        assert_eq!(config.redirect_uri(), "http://localhost:8000/callback");
        assert_eq!(config.scope_param(), "openid email userinfo");
        assert_eq!(config.listen_port(), 8000);
        assert_eq!(config.callback_timeout(), Duration::from_secs(120));
        assert!(!config.use_pkce());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(
            "TEST",
            lookup(&[
                ("TEST_CLIENT_ID", "my-client"),
                ("TEST_CLIENT_SECRET", "my-secret"),
                ("TEST_REDIRECT_URI", "http://localhost:9000/cb"),
                ("TEST_TOKEN_URL", "https://idp.example.com/token"),
                ("TEST_SCOPES", "openid,profile"),
                ("TEST_CALLBACK_TIMEOUT_SECS", "30"),
                ("TEST_USE_PKCE", "yes"),
            ]),
        )
        .unwrap();

        assert_eq!(config.client_id(), "my-client");
        assert_eq!(config.client_secret(), "my-secret");
        assert_eq!(config.token_url(), "https://idp.example.com/token");
        assert_eq!(config.auth_url(), DEFAULT_AUTH_URL);
        assert_eq!(config.scopes(), ["openid", "profile"]);
        assert_eq!(config.listen_port(), 9000);
        assert_eq!(config.callback_timeout(), Duration::from_secs(30));
        assert!(config.use_pkce());
    }

    #[rstest]
    #[case(&[("T_CLIENT_SECRET", "s")], "CLIENT_ID")]
    #[case(&[("T_CLIENT_ID", "c")], "CLIENT_SECRET")]
    #[case(&[("T_CLIENT_ID", "  "), ("T_CLIENT_SECRET", "s")], "CLIENT_ID")]
    fn test_missing_credentials(#[case] vars: &[(&str, &str)], #[case] missing: &str) {
        let err = ClientConfig::from_lookup("T", lookup(vars)).unwrap_err();
        assert!(matches!(err, LoginError::MissingConfig(name) if name == missing));
    }

    #[rstest]
    #[case("T_PORT", "eighty")]
    #[case("T_AUTH_URL", "not a url")]
    #[case("T_USE_PKCE", "maybe")]
    #[case("T_CALLBACK_TIMEOUT_SECS", "0")]
    fn test_invalid_values(#[case] key: &str, #[case] value: &str) {
        let err = ClientConfig::from_lookup(
            "T",
            lookup(&[("T_CLIENT_ID", "c"), ("T_CLIENT_SECRET", "s"), (key, value)]),
        )
        .unwrap_err();
        assert!(matches!(err, LoginError::InvalidConfig(_)), "{:?}", err);
    }

    #[test]
    fn test_explicit_port_overrides_redirect_port() {
        let config = ClientConfig::new("id", "secret").with_listen_port(0);
        assert_eq!(config.listen_port(), 0);
    }

    #[test]
    fn test_redirect_uri_for_port() {
        let config = ClientConfig::new("id", "secret");
        assert_eq!(
            config.redirect_uri_for_port(54321).unwrap(),
            "http://localhost:54321/callback"
        );
        assert_eq!(
            config.redirect_uri_for_port(8000).unwrap(),
            "http://localhost:8000/callback"
        );
    }

    #[test]
    fn test_effective_redirect_uri_is_verbatim_for_matching_port() {
        let config = ClientConfig::new("id", "secret").with_redirect_uri("http://localhost:8000");
        assert_eq!(config.effective_redirect_uri(8000).unwrap(), "http://localhost:8000");
        assert_eq!(
            config.effective_redirect_uri(9001).unwrap(),
            "http://localhost:9001/"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ClientConfig::new("id", "super-secret-value");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("<redacted>"));
    }
}
