//! Precondition handler trait.
//!
//! A precondition is an external dependency that must be running before the
//! test body executes, such as a compose stack.

use async_trait::async_trait;

use crate::error::Result;

/// Start/stop capable collaborator started before tests and stopped after.
///
/// # Contract
///
/// - `start` is called at most once per run, in configuration order.
/// - `stop` is called exactly once for every handler whose `start`
///   succeeded, in reverse configuration order, whatever happened in
///   between. It is never called for a handler whose `start` failed or
///   was never reached.
/// - A failing `stop` is recorded; it does not prevent other handlers from
///   being stopped.
#[async_trait]
pub trait Precondition: Send + Sync {
    /// Human-readable name used in logs and error messages.
    fn name(&self) -> &str;

    /// Brings the dependency up.
    ///
    /// # Errors
    /// Returns [`RunError::PreconditionStart`](crate::RunError::PreconditionStart)
    /// carrying the backend diagnostic.
    async fn start(&mut self) -> Result<()>;

    /// Tears the dependency down and releases its resources.
    ///
    /// # Errors
    /// Returns [`RunError::PreconditionStop`](crate::RunError::PreconditionStop)
    /// carrying the backend diagnostic.
    async fn stop(&mut self) -> Result<()>;
}
