//! Readiness stub server.
//!
//! A minimal HTTP server answering `503 Service Unavailable` until a
//! configured delay has passed, then `200 OK`. It runs on its own thread and
//! runtime so it keeps serving while the test's runtime is blocked in the
//! orchestrator.

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::runtime::Builder;
use tokio::sync::oneshot;

use crate::error::{Result, TestError};

#[derive(Clone)]
struct StubState {
    started: Instant,
    ready_after: Option<Duration>,
    hits: Arc<AtomicU32>,
}

async fn health(State(state): State<StubState>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    match state.ready_after {
        Some(delay) if state.started.elapsed() >= delay => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Handle to a running readiness stub; shuts the server down on drop.
#[derive(Debug)]
pub struct ReadinessStub {
    url: String,
    hits: Arc<AtomicU32>,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl ReadinessStub {
    /// Serves `503` for `delay` after startup, then `200`.
    ///
    /// # Errors
    /// Returns an error if no loopback port can be bound.
    pub fn ready_after(delay: Duration) -> Result<Self> {
        Self::spawn(Some(delay))
    }

    /// Serves `200` from the start.
    ///
    /// # Errors
    /// Returns an error if no loopback port can be bound.
    pub fn ready() -> Result<Self> {
        Self::spawn(Some(Duration::ZERO))
    }

    /// Serves `503` forever.
    ///
    /// # Errors
    /// Returns an error if no loopback port can be bound.
    pub fn never_ready() -> Result<Self> {
        Self::spawn(None)
    }

    fn spawn(ready_after: Option<Duration>) -> Result<Self> {
        let listener = StdTcpListener::bind("127.0.0.1:0")
            .map_err(|e| TestError::stub(format!("bind failed: {e}")))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let url = format!("http://{addr}/healthz");

        let hits = Arc::new(AtomicU32::new(0));
        let state = StubState {
            started: Instant::now(),
            ready_after,
            hits: Arc::clone(&hits),
        };
        let app = Router::new().route("/healthz", get(health)).with_state(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let join = thread::Builder::new()
            .name("readiness-stub".into())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!(error = %e, "readiness stub runtime failed");
                        return;
                    }
                };
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            tracing::error!(error = %e, "readiness stub listener failed");
                            return;
                        }
                    };
                    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                        let _ = shutdown_rx.await;
                    });
                    if let Err(e) = server.await {
                        tracing::error!(error = %e, "readiness stub stopped");
                    }
                });
            })?;

        tracing::debug!(url = %url, ready_after = ?ready_after, "readiness stub listening");
        Ok(Self {
            url,
            hits,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        })
    }

    /// Health endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of requests served so far.
    #[must_use]
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for ReadinessStub {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
