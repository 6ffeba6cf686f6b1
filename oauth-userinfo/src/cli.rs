//! Command-line arguments.

use std::collections::HashMap;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use oauth_userinfo_core::{ClientConfig, OutputFormat, DEFAULT_ENV_PREFIX};

#[derive(Debug, Parser)]
#[command(
    name = "oauth-userinfo",
    version,
    about = "Log in with OAuth2 and print the authenticated user's profile",
    long_about = "Runs one OAuth2 authorization-code login: opens the browser, captures the \
                  redirect on a local listener, exchanges the code for a token and prints the \
                  userinfo claims. Every option can also be set through {PREFIX}_* environment \
                  variables (default prefix OAUTH_USERINFO)."
)]
pub struct Cli {
    /// OAuth client ID
    #[arg(long)]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long)]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the provider
    #[arg(long)]
    pub redirect_uri: Option<String>,

    /// Authorization endpoint
    #[arg(long)]
    pub auth_url: Option<String>,

    /// Token endpoint
    #[arg(long)]
    pub token_url: Option<String>,

    /// Userinfo endpoint
    #[arg(long)]
    pub userinfo_url: Option<String>,

    /// Requested scopes, space or comma separated
    #[arg(long)]
    pub scopes: Option<String>,

    /// Host the callback listener binds
    #[arg(long)]
    pub host: Option<String>,

    /// Port the callback listener binds (0 for any free port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Seconds to wait for the browser redirect
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Use PKCE (S256)
    #[arg(long)]
    pub pkce: bool,

    /// Do not try to open a browser; print the URL instead
    #[arg(long)]
    pub no_browser: bool,

    /// Print only the profile JSON
    #[arg(long)]
    pub json: bool,

    /// Prefix of the configuration environment variables
    #[arg(long, default_value = DEFAULT_ENV_PREFIX)]
    pub env_prefix: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    /// Assemble the client configuration: flags over environment over defaults.
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        self.client_config_with(|key| std::env::var(key).ok())
    }

    /// Same as [`Cli::client_config`] with an explicit environment lookup.
    pub fn client_config_with<F>(&self, env: F) -> anyhow::Result<ClientConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = self.overrides();
        ClientConfig::from_lookup(&self.env_prefix, |key| {
            overrides.get(key).cloned().or_else(|| env(key))
        })
        .with_context(|| {
            format!(
                "failed to load configuration (flags or {}_* environment variables)",
                self.env_prefix
            )
        })
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Report
        }
    }

    /// Flag values keyed by the environment variable they override.
    fn overrides(&self) -> HashMap<String, String> {
        let entries = [
            ("CLIENT_ID", self.client_id.clone()),
            ("CLIENT_SECRET", self.client_secret.clone()),
            ("REDIRECT_URI", self.redirect_uri.clone()),
            ("AUTH_URL", self.auth_url.clone()),
            ("TOKEN_URL", self.token_url.clone()),
            ("USERINFO_URL", self.userinfo_url.clone()),
            ("SCOPES", self.scopes.clone()),
            ("LISTEN_HOST", self.host.clone()),
            ("PORT", self.port.map(|p| p.to_string())),
            ("CALLBACK_TIMEOUT_SECS", self.timeout.map(|t| t.to_string())),
            ("USE_PKCE", self.pkce.then(|| "true".to_string())),
        ];

        entries
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (format!("{}_{}", self.env_prefix, name), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_flags_override_environment() {
        let cli = Cli::try_parse_from([
            "oauth-userinfo",
            "--client-id",
            "from-flag",
            "--port",
            "0",
            "--timeout",
            "15",
            "--pkce",
        ])
        .unwrap();

        let config = cli
            .client_config_with(env(&[
                ("OAUTH_USERINFO_CLIENT_ID", "from-env"),
                ("OAUTH_USERINFO_CLIENT_SECRET", "env-secret"),
                ("OAUTH_USERINFO_PORT", "9000"),
            ]))
            .unwrap();

        assert_eq!(config.client_id(), "from-flag");
        assert_eq!(config.client_secret(), "env-secret");
        assert_eq!(config.listen_port(), 0);
        assert_eq!(config.callback_timeout(), Duration::from_secs(15));
        assert!(config.use_pkce());
    }

    #[test]
    fn test_custom_prefix() {
        let cli = Cli::try_parse_from(["oauth-userinfo", "--env-prefix", "PRAMARI"]).unwrap();
        let config = cli
            .client_config_with(env(&[
                ("PRAMARI_CLIENT_ID", "id"),
                ("PRAMARI_CLIENT_SECRET", "secret"),
            ]))
            .unwrap();
        assert_eq!(config.client_id(), "id");
        assert!(!config.use_pkce());
    }

    #[test]
    fn test_missing_secret_is_reported() {
        let cli = Cli::try_parse_from(["oauth-userinfo", "--client-id", "id"]).unwrap();
        let err = cli.client_config_with(env(&[])).unwrap_err();
        assert!(format!("{:#}", err).contains("Missing configuration: CLIENT_SECRET"));
    }

    #[test]
    fn test_output_and_logging_flags() {
        let cli = Cli::try_parse_from(["oauth-userinfo", "--json", "-vv", "--log-format", "json"])
            .unwrap();
        assert_eq!(cli.output_format(), OutputFormat::Json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Json);

        let cli = Cli::try_parse_from(["oauth-userinfo"]).unwrap();
        assert_eq!(cli.output_format(), OutputFormat::Report);
        assert!(!cli.no_browser);
    }
}
