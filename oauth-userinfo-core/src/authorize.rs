//! Authorization request construction and browser launch.

use tracing::{info, warn};
use url::Url;

use crate::config::{parse_url, ClientConfig};
use crate::context::FlowContext;
use crate::error::{LoginError, Result};

/// Build the authorization URL for this run.
///
/// Appends `client_id`, `response_type=code`, `redirect_uri`, `scope` and
/// `state` (plus the PKCE challenge when enabled) to the authorization
/// endpoint.
pub fn authorization_url(config: &ClientConfig, context: &FlowContext) -> Result<Url> {
    let mut url = parse_url("AUTH_URL", config.auth_url())?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", config.client_id())
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &context.redirect_uri)
            .append_pair("scope", &config.scope_param())
            .append_pair("state", &context.state);
        if let Some(pkce) = &context.pkce {
            query
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256");
        }
    }
    Ok(url)
}

/// Opens URLs for the user.
pub trait BrowserLauncher: Send + Sync {
    /// Open `url`. Failure is reported as [`LoginError::BrowserLaunchFailed`].
    fn open(&self, url: &str) -> Result<()>;
}

/// Opens the system's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        webbrowser::open(url).map_err(|e| LoginError::BrowserLaunchFailed(e.to_string()))
    }
}

/// Never opens anything; the URL is always printed instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualBrowser;

impl BrowserLauncher for ManualBrowser {
    fn open(&self, _url: &str) -> Result<()> {
        Err(LoginError::BrowserLaunchFailed(
            "automatic browser launch disabled".to_string(),
        ))
    }
}

/// Open the authorization URL, falling back to printing it.
///
/// Returns `true` if the launcher reported success.
pub fn launch(launcher: &dyn BrowserLauncher, url: &Url) -> bool {
    eprintln!("Opening browser for authentication...");
    match launcher.open(url.as_str()) {
        Ok(()) => {
            info!("Browser opened for authorization");
            true
        }
        Err(e) => {
            warn!(error = %e, "Falling back to manual browser navigation");
            eprintln!("Please open this URL in your browser:\n\n  {}\n", url);
            false
        }
    }
}
