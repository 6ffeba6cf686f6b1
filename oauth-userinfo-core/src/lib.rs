//! # oauth-userinfo-core
//!
//! A single OAuth 2.0 authorization-code login against an identity provider,
//! ending with the authenticated user's profile.
//!
//! ## Components
//!
//! - **[`CallbackServer`]**: one-shot local HTTP listener capturing the redirect
//! - **[`authorization_url`] / [`BrowserLauncher`]**: builds the authorization
//!   request and opens it in the user's browser
//! - **[`exchange_code`]**: trades the authorization code for an access token
//! - **[`fetch_user_info`]**: retrieves the profile with the bearer token
//! - **[`LoginFlow`]**: sequences the above as a single-pass state machine
//!
//! Tokens are never stored. Every run generates its own anti-replay `state`
//! and owns its own listener, so runs share nothing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use oauth_userinfo_core::{render, ClientConfig, LoginFlow, OutputFormat};
//!
//! let config = ClientConfig::from_env("OAUTH_USERINFO")?;
//! let outcome = LoginFlow::new(config)?.run().await?;
//! print!("{}", render(&outcome.profile, OutputFormat::Report));
//! ```

#![deny(unsafe_code)]

pub mod authorize;
pub mod config;
pub mod context;
pub mod error;
pub mod flow;
pub mod report;
pub mod server;
pub mod token;
pub mod userinfo;

#[cfg(test)]
mod test_support;

// Re-exports
pub use authorize::{authorization_url, launch, BrowserLauncher, ManualBrowser, SystemBrowser};
pub use config::{ClientConfig, DEFAULT_ENV_PREFIX};
pub use context::{FlowContext, Pkce};
pub use error::{LoginError, Result};
pub use flow::{FlowState, LoginFlow, LoginOutcome};
pub use report::{render, OutputFormat};
pub use server::{AuthorizationCallback, CallbackHandle, CallbackParams, CallbackServer};
pub use token::{exchange_code, TokenResponse};
pub use userinfo::{fetch_user_info, UserProfile};

/// Re-exported so callers can cancel a flow without depending on tokio-util.
pub use tokio_util::sync::CancellationToken;
