//! Error types for the login flow.
//!
//! Every variant except [`LoginError::BrowserLaunchFailed`] is terminal for the
//! current run. The flow never retries; the error is surfaced to the caller
//! with enough detail (HTTP status and body where available) to diagnose it.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while running the login flow.
#[derive(Debug, Error)]
pub enum LoginError {
    /// The callback listener could not bind its address.
    #[error("Callback port unavailable on {addr}")]
    PortUnavailable {
        /// Address the listener tried to bind.
        addr: String,
        /// Underlying bind error.
        #[source]
        source: std::io::Error,
    },

    /// No callback arrived before the deadline.
    #[error("Timed out after {}s waiting for the authorization callback", .timeout.as_secs())]
    CallbackTimeout {
        /// The wait that elapsed.
        timeout: Duration,
    },

    /// The callback request carried no `code` parameter.
    #[error("Callback did not include an authorization code{}", provider_suffix(.provider_error))]
    CallbackMissingCode {
        /// `error` (and `error_description`) sent back by the provider, if any.
        provider_error: Option<String>,
    },

    /// The `state` echoed by the provider does not match the one we sent.
    #[error("State mismatch: expected {expected}, got {}", .actual.as_deref().unwrap_or("<none>"))]
    StateMismatch {
        /// State generated for this run.
        expected: String,
        /// State received on the callback.
        actual: Option<String>,
    },

    /// The token endpoint answered with a non-200 status.
    #[error("Token request failed: HTTP {status}: {body}")]
    TokenExchangeFailed {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The token endpoint answered 200 without an `access_token`.
    #[error("No access token received")]
    TokenMissing,

    /// The userinfo endpoint answered with a non-200 status.
    #[error("User info request failed: HTTP {status}: {body}")]
    UserInfoFailed {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The system browser could not be opened. Recovered by printing the URL.
    #[error("Could not open browser: {0}")]
    BrowserLaunchFailed(String),

    /// The flow was cancelled by the user.
    #[error("Login cancelled")]
    Cancelled,

    /// A required configuration value is absent.
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    /// A configuration value failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport-level failure of an outbound request.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A successful response whose body could not be understood.
    #[error("Invalid response from {endpoint}: {message}")]
    InvalidResponse {
        /// Which endpoint produced the body.
        endpoint: &'static str,
        /// Parse failure description.
        message: String,
    },

    /// Socket failure on the callback listener after it was bound.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn provider_suffix(provider_error: &Option<String>) -> String {
    provider_error
        .as_deref()
        .map(|e| format!(" (provider error: {})", e))
        .unwrap_or_default()
}

impl LoginError {
    /// Create an invalid response error.
    pub fn invalid_response(endpoint: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            endpoint,
            message: message.into(),
        }
    }

    /// Whether this error ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::BrowserLaunchFailed(_))
    }

    /// HTTP status of a failed token or userinfo call.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TokenExchangeFailed { status, .. } | Self::UserInfoFailed { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Short stable name of the failure kind, used for the `Failed` flow state.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PortUnavailable { .. } => "PortUnavailable",
            Self::CallbackTimeout { .. } => "CallbackTimeout",
            Self::CallbackMissingCode { .. } => "CallbackMissingCode",
            Self::StateMismatch { .. } => "StateMismatch",
            Self::TokenExchangeFailed { .. } => "TokenExchangeFailed",
            Self::TokenMissing => "TokenMissing",
            Self::UserInfoFailed { .. } => "UserInfoFailed",
            Self::BrowserLaunchFailed(_) => "BrowserLaunchFailed",
            Self::Cancelled => "Cancelled",
            Self::MissingConfig(_) => "MissingConfig",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::Http(_) => "Http",
            Self::InvalidResponse { .. } => "InvalidResponse",
            Self::Io(_) => "Io",
        }
    }
}

/// Result type for login operations.
pub type Result<T> = std::result::Result<T, LoginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_browser_failure_is_recoverable() {
        assert!(!LoginError::BrowserLaunchFailed("no display".into()).is_fatal());
        assert!(LoginError::TokenMissing.is_fatal());
        assert!(LoginError::Cancelled.is_fatal());
        assert!(LoginError::CallbackMissingCode {
            provider_error: None
        }
        .is_fatal());
    }

    #[test]
    fn test_status() {
        let err = LoginError::TokenExchangeFailed {
            status: 403,
            body: r#"{"error":"invalid_grant"}"#.into(),
        };
        assert_eq!(err.status(), Some(403));

        let err = LoginError::UserInfoFailed {
            status: 401,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(401));

        assert_eq!(LoginError::TokenMissing.status(), None);
    }

    #[test]
    fn test_display_is_one_line() {
        let err = LoginError::TokenExchangeFailed {
            status: 403,
            body: r#"{"error":"invalid_grant"}"#.into(),
        };
        assert_eq!(
            err.to_string(),
            r#"Token request failed: HTTP 403: {"error":"invalid_grant"}"#
        );

        let err = LoginError::CallbackTimeout {
            timeout: Duration::from_secs(120),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 120s waiting for the authorization callback"
        );
    }

    #[test]
    fn test_missing_code_carries_provider_error() {
        let err = LoginError::CallbackMissingCode {
            provider_error: Some("access_denied".into()),
        };
        assert_eq!(
            err.to_string(),
            "Callback did not include an authorization code (provider error: access_denied)"
        );

        let err = LoginError::CallbackMissingCode {
            provider_error: None,
        };
        assert_eq!(err.to_string(), "Callback did not include an authorization code");
    }

    #[test]
    fn test_port_unavailable_names_cause_once() {
        let err = LoginError::PortUnavailable {
            addr: "127.0.0.1:8000".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "Address already in use"),
        };
        assert_eq!(err.to_string(), "Callback port unavailable on 127.0.0.1:8000");

        let cause = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(cause.as_deref(), Some("Address already in use"));
    }

    #[test]
    fn test_state_mismatch_without_state() {
        let err = LoginError::StateMismatch {
            expected: "abc".into(),
            actual: None,
        };
        assert_eq!(err.to_string(), "State mismatch: expected abc, got <none>");
        assert_eq!(err.kind(), "StateMismatch");
    }
}
