//! Single-shot loopback listener for the authorization-code redirect.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Path the identity provider redirects to.
pub const CALLBACK_PATH: &str = "/callback";

const SUCCESS_PAGE: &str = "Login complete. You may close this window.";
const FAILURE_PAGE: &str = "Login failed. You may close this window.";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What the first callback request carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn into_outcome(self) -> CallbackOutcome {
        let provider_error = [self.error_description, self.error]
            .into_iter()
            .flatten()
            .find(|v| !v.is_empty());
        if let Some(reason) = provider_error {
            return CallbackOutcome::Failed(reason);
        }
        match self.code.filter(|c| !c.is_empty()) {
            Some(code) => CallbackOutcome::Code(code),
            None => CallbackOutcome::Failed("redirect carried no authorization code".into()),
        }
    }
}

struct CallbackState {
    outcome: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

impl CallbackState {
    /// Complete the rendezvous. Only the first call has any effect.
    fn resolve(&self, outcome: CallbackOutcome) -> bool {
        let sender = match self.outcome.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Listener bound for the duration of one browser login.
pub struct LoopbackServer {
    addr: SocketAddr,
    outcome: oneshot::Receiver<CallbackOutcome>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for LoopbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackServer")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl LoopbackServer {
    /// Bind all interfaces on `port` and start serving.
    ///
    /// Listens on `::` so both `127.0.0.1` and `::1` reach the callback,
    /// falling back to IPv4 only on hosts without IPv6. Port `0` picks an
    /// ephemeral port; an occupied port fails with [`Error::PortInUse`]
    /// rather than falling back to another one.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = match tokio::net::TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == ErrorKind::AddrInUse => return Err(Error::PortInUse { port }),
            Err(e) => {
                tracing::debug!(error = %e, "IPv6 unavailable, listening on IPv4 only");
                match tokio::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
                    Ok(listener) => listener,
                    Err(e) if e.kind() == ErrorKind::AddrInUse => {
                        return Err(Error::PortInUse { port });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };
        let addr = listener.local_addr()?;

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = Arc::new(CallbackState {
            outcome: Mutex::new(Some(outcome_tx)),
        });

        let app = Router::new()
            .route(CALLBACK_PATH, get(callback_handler))
            .fallback(not_found_handler)
            .with_state(state);

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                // Dropping the state closes the rendezvous, which the waiter
                // reports as a failed login.
                tracing::warn!(error = %e, "Loopback listener failed");
            }
        });

        tracing::debug!(%addr, "Loopback listener started");
        Ok(Self {
            addr,
            outcome: outcome_rx,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Redirect URI registered with the identity provider.
    pub fn redirect_uri(&self) -> String {
        redirect_uri_for(self.port())
    }

    /// Block until the first callback arrives, then stop listening.
    pub async fn wait(self) -> Result<String> {
        self.wait_inner(None).await
    }

    /// Like [`wait`](Self::wait), but give up after `limit` with
    /// [`Error::CallbackTimeout`].
    pub async fn wait_timeout(self, limit: Duration) -> Result<String> {
        self.wait_inner(Some(limit)).await
    }

    async fn wait_inner(mut self, limit: Option<Duration>) -> Result<String> {
        let received = match limit {
            Some(limit) => match tokio::time::timeout(limit, &mut self.outcome).await {
                Ok(received) => received,
                Err(_) => {
                    self.stop().await;
                    return Err(Error::CallbackTimeout(limit));
                }
            },
            None => (&mut self.outcome).await,
        };
        self.stop().await;

        match received {
            Ok(CallbackOutcome::Code(code)) => Ok(code),
            Ok(CallbackOutcome::Failed(reason)) => Err(Error::AuthorizationFailed(reason)),
            Err(_) => Err(Error::AuthorizationFailed(
                "loopback listener stopped before the redirect arrived".into(),
            )),
        }
    }

    async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
        tracing::debug!(addr = %self.addr, "Loopback listener stopped");
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn redirect_uri_for(port: u16) -> String {
    format!("http://localhost:{}{}", port, CALLBACK_PATH)
}

async fn callback_handler(
    State(state): State<Arc<CallbackState>>,
    params: std::result::Result<Query<CallbackParams>, QueryRejection>,
) -> impl IntoResponse {
    let outcome = match params {
        Ok(Query(params)) => params.into_outcome(),
        Err(rejection) => {
            state.resolve(CallbackOutcome::Failed(rejection.body_text()));
            return (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_PAGE);
        }
    };

    let response = match &outcome {
        CallbackOutcome::Code(_) => (StatusCode::OK, SUCCESS_PAGE),
        CallbackOutcome::Failed(reason) => {
            tracing::debug!(%reason, "Authorization redirect reported failure");
            (StatusCode::BAD_REQUEST, FAILURE_PAGE)
        }
    };

    if !state.resolve(outcome) {
        tracing::debug!("Ignoring callback after the login was already resolved");
    }
    response
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(code: Option<&str>, error: Option<&str>, description: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(Into::into),
            error: error.map(Into::into),
            error_description: description.map(Into::into),
        }
    }

    #[test]
    fn test_outcome_prefers_description() {
        let outcome = params(Some("c"), Some("access_denied"), Some("User cancelled")).into_outcome();
        assert_eq!(outcome, CallbackOutcome::Failed("User cancelled".into()));

        let outcome = params(None, Some("access_denied"), None).into_outcome();
        assert_eq!(outcome, CallbackOutcome::Failed("access_denied".into()));
    }

    #[test]
    fn test_outcome_code() {
        assert_eq!(
            params(Some("abc"), None, Some("")).into_outcome(),
            CallbackOutcome::Code("abc".into())
        );
        assert!(matches!(
            params(None, None, None).into_outcome(),
            CallbackOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_redirect_uri() {
        assert_eq!(redirect_uri_for(63265), "http://localhost:63265/callback");
    }

    #[tokio::test]
    async fn test_stray_request_then_code() {
        let server = LoopbackServer::bind(0).await.unwrap();
        let base = format!("http://127.0.0.1:{}", server.port());

        let client = reqwest::Client::new();
        let favicon = client.get(format!("{}/favicon.ico", base)).send().await.unwrap();
        assert_eq!(favicon.status(), 404);

        let callback = client
            .get(format!("{}/callback?code=the-code&state=x", base))
            .send()
            .await
            .unwrap();
        assert_eq!(callback.status(), 200);
        assert!(callback.text().await.unwrap().contains("Login complete"));

        assert_eq!(server.wait().await.unwrap(), "the-code");
    }

    #[tokio::test]
    async fn test_provider_error_resolves_failure() {
        let server = LoopbackServer::bind(0).await.unwrap();
        let url = format!(
            "http://127.0.0.1:{}/callback?error=access_denied&error_description=access_denied",
            server.port()
        );

        let waiter = tokio::spawn(server.wait());
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 400);
        assert!(response.text().await.unwrap().contains("Login failed"));

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::AuthorizationFailed(_)));
        assert!(err.to_string().contains("access_denied"));
    }

    #[tokio::test]
    async fn test_ipv6_loopback_reaches_callback() {
        if std::net::TcpListener::bind((Ipv6Addr::LOCALHOST, 0)).is_err() {
            return;
        }
        let server = LoopbackServer::bind(0).await.unwrap();
        let url = format!("http://[::1]:{}/callback?code=v6-code", server.port());

        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(server.wait().await.unwrap(), "v6-code");
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let first = LoopbackServer::bind(0).await.unwrap();
        let err = LoopbackServer::bind(first.port()).await.unwrap_err();
        assert!(matches!(err, Error::PortInUse { port } if port == first.port()));
    }

    #[tokio::test]
    async fn test_timeout_stops_listener() {
        let server = LoopbackServer::bind(0).await.unwrap();
        let port = server.port();

        let err = server
            .wait_timeout(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CallbackTimeout(_)));

        // Port is free again
        let again = LoopbackServer::bind(port).await;
        assert!(again.is_ok());
    }
}
