//! One-shot local HTTP listener for the OAuth redirect.
//!
//! The listener accepts exactly one HTTP request. The bound socket is released
//! as soon as that request has been read, and on every other exit path
//! (timeout, cancellation, IO failure) when the serving task ends.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{LoginError, Result};

const MAX_REQUEST_BYTES: usize = 8192;
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authentication Successful</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Authentication successful!</h1>
<p>You can close this window now.</p>
</body>
</html>"#;

const FAILURE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authentication Failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Authentication failed!</h1>
<p>No authorization code received.</p>
</body>
</html>"#;

/// Query parameters carried by the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Echoed anti-replay state.
    pub state: Option<String>,
    /// Provider error code.
    pub error: Option<String>,
    /// Provider error description.
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse the request line of a raw HTTP request.
    ///
    /// Returns `None` unless the request line is a `GET` for an origin-form
    /// target.
    pub fn from_request(request: &str) -> Option<Self> {
        // GET /callback?code=xxx&state=yyy HTTP/1.1
        let first_line = request.lines().next()?;
        let mut parts = first_line.split_whitespace();
        if parts.next()? != "GET" {
            return None;
        }
        let target = parts.next().filter(|t| t.starts_with('/'))?;

        let mut params = Self::default();
        let Some((_, query)) = target.split_once('?') else {
            return Some(params);
        };
        let query = query.split('#').next().unwrap_or_default();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let slot = match key {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            // First occurrence wins.
            if slot.is_none() {
                *slot = Some(decode_component(value));
            }
        }

        Some(params)
    }

    /// Provider error, joined with its description when both are present.
    pub fn provider_error(&self) -> Option<String> {
        match (&self.error, &self.error_description) {
            (Some(e), Some(d)) => Some(format!("{}: {}", e, d)),
            (Some(e), None) => Some(e.clone()),
            (None, Some(d)) => Some(d.clone()),
            (None, None) => None,
        }
    }
}

fn decode_component(value: &str) -> String {
    let value = value.replace('+', " ");
    match urlencoding::decode(&value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value,
    }
}

/// Authorization code captured from the redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationCallback {
    /// Authorization code, single use.
    pub code: String,
    /// State echoed by the provider.
    pub state: Option<String>,
}

impl std::fmt::Debug for AuthorizationCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCallback")
            .field("code", &"<redacted>")
            .field("state", &self.state)
            .finish()
    }
}

/// Local HTTP server that receives the OAuth redirect.
#[derive(Debug)]
pub struct CallbackServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackServer {
    /// Bind the listener. Port `0` picks an ephemeral port.
    ///
    /// A port already in use fails immediately with
    /// [`LoginError::PortUnavailable`]; there is no fallback port.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let requested = format!("{}:{}", host, port);
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| LoginError::PortUnavailable {
                addr: requested.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        debug!(%addr, "Callback listener bound");
        Ok(Self { listener, addr })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Start serving in the background.
    ///
    /// Cancelling `cancel` stops the listener and resolves the handle with
    /// [`LoginError::Cancelled`].
    pub fn spawn(self, cancel: &CancellationToken) -> CallbackHandle {
        let shutdown = cancel.child_token();
        let (tx, rx) = oneshot::channel();
        let addr = self.addr;
        let task_shutdown = shutdown.clone();

        let task = tokio::spawn(async move {
            let result = self.serve_one(task_shutdown).await;
            let _ = tx.send(result);
        });

        CallbackHandle {
            rx,
            task,
            shutdown,
            addr,
        }
    }

    async fn serve_one(self, shutdown: CancellationToken) -> Result<AuthorizationCallback> {
        let Self { listener, addr } = self;
        let mut pending = JoinSet::new();

        let (mut stream, params) = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(%addr, "Callback listener stopped");
                    return Err(LoginError::Cancelled);
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Callback connection accepted");
                        pending.spawn(read_request(stream));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept callback connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = pending.join_next() => match joined {
                    Ok(Ok((stream, Some(params)))) => break (stream, params),
                    Ok(Ok((_, None))) => debug!("Connection closed without a callback request"),
                    Ok(Err(e)) => debug!(error = %e, "Failed to read callback request"),
                    Err(e) => warn!(error = %e, "Callback reader task failed"),
                },
            }
        };

        // One request per run: stop accepting and drop any other connection.
        drop(listener);
        pending.abort_all();

        let outcome = match params.code {
            Some(ref code) => Ok(AuthorizationCallback {
                code: code.clone(),
                state: params.state.clone(),
            }),
            None => Err(LoginError::CallbackMissingCode {
                provider_error: params.provider_error(),
            }),
        };

        let response = match outcome {
            Ok(_) => {
                info!("Authorization code received");
                http_response("200 OK", SUCCESS_HTML)
            }
            Err(_) => {
                let provider_error = params.provider_error().unwrap_or_else(|| "none".into());
                warn!(%provider_error, "Callback without authorization code");
                http_response("400 Bad Request", FAILURE_HTML)
            }
        };
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            debug!(error = %e, "Failed to write callback response");
        }
        let _ = stream.shutdown().await;

        outcome
    }
}

/// Read one request head.
///
/// `None` if the peer sent nothing or something other than a `GET` request
/// line. A head cut short by the read timeout is still parsed.
async fn read_request(
    mut stream: TcpStream,
) -> std::io::Result<(TcpStream, Option<CallbackParams>)> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let read = tokio::time::timeout(READ_TIMEOUT, async {
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if head_complete(&buf) || buf.len() >= MAX_REQUEST_BYTES {
                break;
            }
        }
        Ok::<_, std::io::Error>(())
    })
    .await;

    match read {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(_) => debug!(bytes = buf.len(), "Timed out reading callback request head"),
    }

    if buf.is_empty() {
        return Ok((stream, None));
    }
    let params = CallbackParams::from_request(&String::from_utf8_lossy(&buf));
    if params.is_none() {
        debug!("Dropping connection without a GET request line");
    }
    Ok((stream, params))
}

/// Blank line ending the head, with CRLF or bare LF line endings.
fn head_complete(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.windows(2).any(|w| w == b"\n\n")
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

/// Handle to a running callback listener.
#[derive(Debug)]
pub struct CallbackHandle {
    rx: oneshot::Receiver<Result<AuthorizationCallback>>,
    task: JoinHandle<()>,
    shutdown: CancellationToken,
    addr: SocketAddr,
}

impl CallbackHandle {
    /// Port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the callback, at most `timeout`.
    ///
    /// The listener is stopped and its port released before this returns,
    /// whatever the outcome.
    pub async fn wait(mut self, timeout: Duration) -> Result<AuthorizationCallback> {
        let addr = self.addr;
        let outcome = tokio::select! {
            received = &mut self.rx => received.unwrap_or_else(|_| {
                Err(LoginError::Io(std::io::Error::other(
                    "callback listener stopped unexpectedly",
                )))
            }),
            _ = tokio::time::sleep(timeout) => {
                warn!(%addr, timeout_secs = timeout.as_secs(), "Timed out waiting for callback");
                Err(LoginError::CallbackTimeout { timeout })
            }
        };

        self.shutdown.cancel();
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "Callback listener task failed");
        }

        outcome
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        // An abandoned handle must not keep the port bound.
        self.shutdown.cancel();
    }
}
