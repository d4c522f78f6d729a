//! Core types for the integration-test lifecycle.
//!
//! The orchestrator is a linear state machine with unconditional cleanup,
//! no implicit transitions and no way back.

use std::fmt;

/// Orchestration state.
///
/// ```text
/// Configured → Built → PreconditionsStarted → Ready → TestRan → CleanedUp → Done
/// ```
///
/// A failing phase skips ahead to `CleanedUp`. A build failure ends the run
/// in `Configured`, since nothing was started that needs stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunState {
    /// Options applied, nothing started.
    Configured,
    /// Binary built (or no binary configured).
    Built,
    /// Every precondition handler started.
    PreconditionsStarted,
    /// Readiness probe passed (or none configured).
    Ready,
    /// Test body finished, whatever its outcome.
    TestRan,
    /// Binary and preconditions stopped.
    CleanedUp,
    /// Errors combined, result handed back.
    Done,
}

impl RunState {
    /// Returns the state that follows this one on the happy path.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Configured => Self::Built,
            Self::Built => Self::PreconditionsStarted,
            Self::PreconditionsStarted => Self::Ready,
            Self::Ready => Self::TestRan,
            Self::TestRan => Self::CleanedUp,
            Self::CleanedUp | Self::Done => Self::Done,
        }
    }

    /// Returns true once the run can no longer make progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configured => "configured",
            Self::Built => "built",
            Self::PreconditionsStarted => "preconditions-started",
            Self::Ready => "ready",
            Self::TestRan => "test-ran",
            Self::CleanedUp => "cleaned-up",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Phase a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Applying configuration options.
    Configure,
    /// Compiling the target.
    Build,
    /// Starting a precondition handler.
    PreconditionStart,
    /// Waiting for readiness.
    Readiness,
    /// Spawning the built binary.
    BinaryStart,
    /// Running the test body.
    Test,
    /// Stopping the binary.
    BinaryStop,
    /// Stopping a precondition handler.
    PreconditionStop,
}

impl Phase {
    /// Returns true for the phases that run during cleanup.
    #[must_use]
    pub const fn is_cleanup(self) -> bool {
        matches!(self, Self::BinaryStop | Self::PreconditionStop)
    }

    /// Short stable label used in aggregated error output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Build => "build",
            Self::PreconditionStart => "precondition-start",
            Self::Readiness => "readiness",
            Self::BinaryStart => "binary-start",
            Self::Test => "test",
            Self::BinaryStop => "binary-stop",
            Self::PreconditionStop => "precondition-stop",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    /// OS process ID.
    pub pid: u32,
}

impl ProcessHandle {
    /// Creates a handle for the given PID.
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self { pid }
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.pid)
    }
}
