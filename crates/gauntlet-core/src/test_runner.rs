//! Test runner shapes.
//!
//! Exactly one shape is active per run:
//!
//! - [`TestRunner::Suite`] wraps a whole-process entry point (for example the
//!   `main` of a `harness = false` test target) and translates a non-zero
//!   completion code into [`RunError::TestsFailed`].
//! - [`TestRunner::Func`] wraps a single test function. Its failure signal
//!   is a panic, the host test framework's own channel; the orchestrator
//!   re-raises it after cleanup instead of translating it.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::{Result, RunError};

/// Boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Whole-process suite: resolves to a completion code, `0` meaning success.
pub type SuiteFn = Box<dyn FnOnce() -> BoxFuture<i32> + Send>;

/// Single test function: completes normally on success, panics on failure.
pub type TestFn = Box<dyn FnOnce() -> BoxFuture<()> + Send>;

/// Test body invoked once preconditions are ready.
pub enum TestRunner {
    /// Whole-process suite returning a completion code.
    Suite(SuiteFn),
    /// Single test function signalling failure by panicking.
    Func(TestFn),
}

/// What running the test body produced.
#[derive(Debug)]
pub enum TestOutcome {
    /// Body completed successfully.
    Passed,
    /// Body failed with a translated error.
    Failed(RunError),
    /// Test function panicked; payload must be resumed after cleanup.
    Panicked(Box<dyn Any + Send + 'static>),
}

impl TestRunner {
    /// Wraps an async suite entry point.
    pub fn suite<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = i32> + Send + 'static,
    {
        Self::Suite(Box::new(move || Box::pin(f())))
    }

    /// Wraps an async test function.
    pub fn func<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Func(Box::new(move || Box::pin(f())))
    }

    /// Shape name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Suite(_) => "suite",
            Self::Func(_) => "func",
        }
    }

    /// Runs the body on its own task so a panic can be observed instead of
    /// unwinding through the orchestrator.
    pub async fn execute(self) -> TestOutcome {
        match self {
            Self::Suite(f) => match tokio::spawn(f()).await {
                Ok(code) => match check_code(code) {
                    Ok(()) => TestOutcome::Passed,
                    Err(err) => TestOutcome::Failed(err),
                },
                Err(e) if e.is_panic() => {
                    TestOutcome::Failed(RunError::TestPanicked(panic_message(&*e.into_panic())))
                }
                Err(e) => TestOutcome::Failed(RunError::TestPanicked(e.to_string())),
            },
            Self::Func(f) => match tokio::spawn(f()).await {
                Ok(()) => TestOutcome::Passed,
                Err(e) if e.is_panic() => TestOutcome::Panicked(e.into_panic()),
                Err(e) => TestOutcome::Failed(RunError::TestPanicked(e.to_string())),
            },
        }
    }
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TestRunner").field(&self.kind()).finish()
    }
}

/// Converts a suite completion code into a result.
///
/// # Errors
/// Returns [`RunError::TestsFailed`] for any non-zero code.
pub fn check_code(code: i32) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(RunError::TestsFailed { code })
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
