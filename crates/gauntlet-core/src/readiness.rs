//! Readiness waiting.
//!
//! Containerized dependencies and freshly started binaries have unbounded
//! startup latency. The waiter polls with a ceiling: transient connection
//! failures count as "not ready yet", only the deadline is fatal.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{Result, RunError};

/// Fixed delay between two probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout of a single HTTP probe request.
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Confirms the system under test is reachable.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Blocks (cooperatively) until ready or the probe gives up.
    ///
    /// # Errors
    /// Returns [`RunError::ReadinessTimeout`] when the deadline passes, or
    /// [`RunError::Readiness`] when the probe cannot run at all.
    async fn wait_ready(&self) -> Result<()>;
}

/// Polls a URL with HTTP GET until it answers `200 OK`.
#[derive(Debug, Clone)]
pub struct HttpReadiness {
    url: String,
    timeout: Duration,
    interval: Duration,
}

impl HttpReadiness {
    /// Creates a waiter for `url` that gives up after `timeout`.
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            interval: POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns the probed URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the configured deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn is_ready(&self, client: &reqwest::Client) -> bool {
        match client.get(&self.url).send().await {
            Ok(resp) => {
                let status = resp.status();
                tracing::debug!(url = %self.url, status = %status, "readiness probe answered");
                status == reqwest::StatusCode::OK
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "readiness probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadiness {
    async fn wait_ready(&self) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_REQUEST_TIMEOUT.min(self.timeout.max(self.interval)))
            .build()
            .map_err(|e| RunError::Readiness(format!("failed to build HTTP client: {e}")))?;

        let started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if self.is_ready(&client).await {
                tracing::info!(
                    url = %self.url,
                    attempts = attempts,
                    elapsed = ?started.elapsed(),
                    "system under test is ready"
                );
                return Ok(());
            }
            if started.elapsed() > self.timeout {
                tracing::warn!(url = %self.url, attempts = attempts, timeout = ?self.timeout, "readiness deadline exceeded");
                return Err(RunError::ReadinessTimeout(self.timeout));
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
