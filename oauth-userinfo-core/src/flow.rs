//! Login flow orchestration.
//!
//! [`LoginFlow::run`] drives one single-pass attempt:
//!
//! 1. Bind the callback listener and generate a fresh [`FlowContext`]
//! 2. Start the listener in the background and open the authorization URL
//! 3. Wait (bounded) for the redirect and verify its `state`
//! 4. Exchange the code for an access token
//! 5. Fetch the user's profile with that token
//!
//! Any failure is terminal. Nothing downstream of a failed step runs.

use std::fmt;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::authorize::{authorization_url, launch, BrowserLauncher, SystemBrowser};
use crate::config::ClientConfig;
use crate::context::FlowContext;
use crate::error::{LoginError, Result};
use crate::server::CallbackServer;
use crate::token::{exchange_code, TokenResponse};
use crate::userinfo::{fetch_user_info, UserProfile};

/// Where a login attempt currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingCallback,
    ExchangingToken,
    FetchingProfile,
    Done,
    /// Failed with the given error kind.
    Failed(String),
}

impl FlowState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: &FlowState) -> bool {
        use FlowState::*;
        match (self, next) {
            (Idle, AwaitingCallback)
            | (AwaitingCallback, ExchangingToken)
            | (ExchangingToken, FetchingProfile)
            | (FetchingProfile, Done) => true,
            (current, Failed(_)) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingCallback => write!(f, "awaiting_callback"),
            Self::ExchangingToken => write!(f, "exchanging_token"),
            Self::FetchingProfile => write!(f, "fetching_profile"),
            Self::Done => write!(f, "done"),
            Self::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Claims of the authenticated user.
    pub profile: UserProfile,
    /// Tokens issued for this run. Not persisted.
    pub tokens: TokenResponse,
}

/// One OAuth authorization-code login attempt.
pub struct LoginFlow {
    config: ClientConfig,
    client: Client,
    launcher: Arc<dyn BrowserLauncher>,
    cancel: CancellationToken,
    state: watch::Sender<FlowState>,
}

impl LoginFlow {
    /// Create a flow that opens the system browser.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = config.build_client()?;
        let (state, _) = watch::channel(FlowState::Idle);
        Ok(Self {
            config,
            client,
            launcher: Arc::new(SystemBrowser),
            cancel: CancellationToken::new(),
            state,
        })
    }

    /// Use a different browser launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: impl BrowserLauncher + 'static) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }

    /// Abort the flow when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> FlowState {
        self.state.borrow().clone()
    }

    /// Run the flow to completion.
    pub async fn run(self) -> Result<LoginOutcome> {
        let result = tokio::select! {
            result = self.drive() => result,
            _ = self.cancel.cancelled() => Err(LoginError::Cancelled),
        };

        if let Err(e) = &result {
            error!(error = %e, "Login flow failed");
            self.advance(FlowState::Failed(e.kind().to_string()));
        }
        result
    }

    async fn drive(&self) -> Result<LoginOutcome> {
        let config = &self.config;

        let server = CallbackServer::bind(config.listen_host(), config.listen_port()).await?;
        let redirect_uri = config.effective_redirect_uri(server.port())?;
        let context = FlowContext::new(redirect_uri, config.use_pkce())?;
        let auth_url = authorization_url(config, &context)?;
        debug!(state = %context.state, redirect_uri = %context.redirect_uri, "Flow context created");

        let handle = server.spawn(&self.cancel);
        self.advance(FlowState::AwaitingCallback);
        launch(self.launcher.as_ref(), &auth_url);

        info!(port = handle.port(), "Waiting for authentication callback");
        let callback = handle.wait(config.callback_timeout()).await?;
        context.verify_state(callback.state.as_deref())?;

        self.advance(FlowState::ExchangingToken);
        let tokens = exchange_code(&self.client, config, &context, &callback.code).await?;

        self.advance(FlowState::FetchingProfile);
        let profile = fetch_user_info(&self.client, config, &tokens.access_token).await?;

        self.advance(FlowState::Done);
        Ok(LoginOutcome { profile, tokens })
    }

    fn advance(&self, next: FlowState) {
        self.state.send_modify(|current| {
            if current.can_advance_to(&next) {
                info!(from = %current, to = %next, "Login flow transition");
                *current = next;
            } else {
                warn!(from = %current, to = %next, "Ignoring illegal login flow transition");
            }
        });
    }
}

impl fmt::Debug for LoginFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginFlow")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
