//! Error types for gauntlet-core.
//!
//! Every failure names the phase it came from. Failures from independent
//! phases are collected into an [`ErrorSet`] instead of keeping only the
//! first one, so a broken teardown is never hidden behind a failed test.

use std::fmt;
use std::time::Duration;

use crate::types::Phase;

/// Result type alias for single-phase operations.
pub type Result<T> = std::result::Result<T, RunError>;

/// A failure from one phase of an orchestration run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Invalid option or manifest. Raised before any side effect.
    #[error("configuration error: {0}")]
    Config(String),

    /// Compilation failed; carries the compiler diagnostics.
    #[error("build of '{target}' failed: {output}")]
    Build {
        /// Target that was being built.
        target: String,
        /// Compiler diagnostic output.
        output: String,
    },

    /// The built binary could not be spawned.
    #[error("failed to start binary: {0}")]
    Start(String),

    /// A precondition handler failed to start.
    #[error("precondition '{name}' failed to start: {message}")]
    PreconditionStart {
        /// Handler name.
        name: String,
        /// Backend diagnostic.
        message: String,
    },

    /// Readiness deadline passed without a successful probe.
    #[error("readiness deadline {} exceeded", humantime::format_duration(*.0))]
    ReadinessTimeout(Duration),

    /// A custom readiness probe failed outright.
    #[error("readiness probe failed: {0}")]
    Readiness(String),

    /// The test suite completed with a non-zero code.
    #[error("tests have failed (exit code {code})")]
    TestsFailed {
        /// Completion code reported by the suite.
        code: i32,
    },

    /// The test suite panicked.
    #[error("test suite panicked: {0}")]
    TestPanicked(String),

    /// The binary could not be terminated.
    #[error("failed to stop binary: {0}")]
    Stop(String),

    /// A precondition handler failed to stop.
    #[error("precondition '{name}' failed to stop: {message}")]
    PreconditionStop {
        /// Handler name.
        name: String,
        /// Backend diagnostic.
        message: String,
    },

    /// I/O error outside any subprocess diagnostic.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a build error.
    #[must_use]
    pub fn build(target: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Build {
            target: target.into(),
            output: output.into(),
        }
    }

    /// Creates a binary start error.
    #[must_use]
    pub fn start(msg: impl Into<String>) -> Self {
        Self::Start(msg.into())
    }

    /// Creates a binary stop error.
    #[must_use]
    pub fn stop(msg: impl Into<String>) -> Self {
        Self::Stop(msg.into())
    }

    /// Creates a precondition start error.
    #[must_use]
    pub fn precondition_start(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PreconditionStart {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a precondition stop error.
    #[must_use]
    pub fn precondition_stop(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PreconditionStop {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns the phase this failure belongs to.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Config(_) | Self::Io(_) => Phase::Configure,
            Self::Build { .. } => Phase::Build,
            Self::Start(_) => Phase::BinaryStart,
            Self::PreconditionStart { .. } => Phase::PreconditionStart,
            Self::ReadinessTimeout(_) | Self::Readiness(_) => Phase::Readiness,
            Self::TestsFailed { .. } | Self::TestPanicked(_) => Phase::Test,
            Self::Stop(_) => Phase::BinaryStop,
            Self::PreconditionStop { .. } => Phase::PreconditionStop,
        }
    }

}

/// Aggregated failures from an orchestration run.
///
/// An empty set means success. Order is the order failures were recorded,
/// which is also phase order.
#[derive(Debug, Default)]
pub struct ErrorSet {
    errors: Vec<RunError>,
}

impl ErrorSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn push(&mut self, err: RunError) {
        self.errors.push(err);
    }

    /// Moves every failure of `other` into this set.
    pub fn extend(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    /// Returns true if no failure was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates over recorded failures.
    pub fn iter(&self) -> std::slice::Iter<'_, RunError> {
        self.errors.iter()
    }

    /// Returns true if any failure originated from `phase`.
    #[must_use]
    pub fn contains_phase(&self, phase: Phase) -> bool {
        self.errors.iter().any(|e| e.phase() == phase)
    }

    /// Consumes the set, returning the underlying failures.
    #[must_use]
    pub fn into_inner(self) -> Vec<RunError> {
        self.errors
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    ///
    /// # Errors
    /// Returns the set itself when it holds at least one failure.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<RunError> for ErrorSet {
    fn from(err: RunError) -> Self {
        Self { errors: vec![err] }
    }
}

impl IntoIterator for ErrorSet {
    type Item = RunError;
    type IntoIter = std::vec::IntoIter<RunError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no errors"),
            [only] => write!(f, "1 error occurred:\n\t* [{}] {only}", only.phase()),
            many => {
                write!(f, "{} errors occurred:", many.len())?;
                for err in many {
                    write!(f, "\n\t* [{}] {err}", err.phase())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ErrorSet {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.errors.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}
