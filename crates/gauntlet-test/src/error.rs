//! Test support error types.

/// Result type alias for test support operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Test support errors.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// The stub server could not be set up.
    #[error("stub server error: {0}")]
    Stub(String),

    /// Orchestrator error.
    #[error("run error: {0}")]
    Run(#[from] gauntlet_core::RunError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TestError {
    /// Creates a stub server error.
    #[must_use]
    pub fn stub(msg: impl Into<String>) -> Self {
        Self::Stub(msg.into())
    }
}
