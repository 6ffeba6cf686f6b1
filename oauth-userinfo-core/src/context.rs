//! Per-run flow context.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::error::{LoginError, Result};

/// PKCE verifier and its S256 challenge.
#[derive(Clone)]
pub struct Pkce {
    /// Code verifier sent with the token request.
    pub verifier: String,
    /// Code challenge sent with the authorization request.
    pub challenge: String,
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Runtime state for one login attempt.
///
/// A fresh context is created for every run, so nothing captured by one run
/// can leak into another.
#[derive(Debug, Clone)]
pub struct FlowContext {
    /// Random anti-replay state parameter.
    pub state: String,
    /// PKCE parameters, when enabled.
    pub pkce: Option<Pkce>,
    /// Redirect URI carrying the port the listener actually bound.
    pub redirect_uri: String,
    /// When this context was created (Unix timestamp).
    pub created_at: u64,
}

impl FlowContext {
    /// Create a context with a fresh state value.
    pub fn new(redirect_uri: impl Into<String>, use_pkce: bool) -> Result<Self> {
        let state = random_hex(16)?;
        let pkce = if use_pkce {
            let verifier = random_hex(32)?;
            let challenge = compute_code_challenge(&verifier);
            Some(Pkce {
                verifier,
                challenge,
            })
        } else {
            None
        };

        Ok(Self {
            state,
            pkce,
            redirect_uri: redirect_uri.into(),
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        })
    }

    /// PKCE verifier, when enabled.
    pub fn code_verifier(&self) -> Option<&str> {
        self.pkce.as_ref().map(|p| p.verifier.as_str())
    }

    /// Check the state echoed by the provider.
    pub fn verify_state(&self, received: Option<&str>) -> Result<()> {
        match received {
            Some(actual) if actual == self.state => Ok(()),
            other => Err(LoginError::StateMismatch {
                expected: self.state.clone(),
                actual: other.map(str::to_string),
            }),
        }
    }
}

/// Hex-encode `bytes` random bytes from the OS RNG.
fn random_hex(bytes: usize) -> Result<String> {
    use std::fmt::Write;
    let mut buf = vec![0u8; bytes];
    getrandom::getrandom(&mut buf)
        .map_err(|e| LoginError::Io(std::io::Error::other(e.to_string())))?;
    let mut s = String::with_capacity(bytes * 2);
    for b in buf {
        let _ = write!(s, "{:02x}", b);
    }
    Ok(s)
}

/// PKCE code challenge from verifier (S256 method).
fn compute_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
