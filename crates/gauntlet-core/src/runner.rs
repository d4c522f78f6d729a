//! Lifecycle orchestrator.
//!
//! Sequences build, precondition start, readiness, binary start, binary
//! readiness and the test body, then always stops whatever was started.
//! Every failure along the way is kept in one [`ErrorSet`].

use std::any::Any;

use crate::adapters::CargoBinary;
use crate::binary::BinaryHandler;
use crate::config::RunnerConfig;
use crate::error::{ErrorSet, Result, RunError};
use crate::opts::Opt;
use crate::precondition::Precondition;
use crate::readiness::ReadinessProbe;
use crate::test_runner::{TestOutcome, TestRunner, panic_message};
use crate::types::{Phase, RunState};

/// Exit code used when a run fails for a reason other than a suite code.
const FAILURE_EXIT_CODE: i32 = 1;

/// Orchestrates one integration-test run.
///
/// A runner is single use: [`run`](Self::run) consumes the configured test
/// body and handlers, and a second call fails with a configuration error.
#[derive(Debug)]
pub struct IntegrationTestRunner {
    config: RunnerConfig,
    state: RunState,
    used: bool,
}

impl IntegrationTestRunner {
    /// Applies `opts` in order and validates the result.
    ///
    /// # Errors
    /// Returns the first failing option's error, or a validation error.
    pub fn new(opts: impl IntoIterator<Item = Opt>) -> Result<Self> {
        let mut config = RunnerConfig::new();
        for opt in opts {
            opt(&mut config)?;
        }
        Self::from_config(config)
    }

    /// Wraps an already assembled configuration.
    ///
    /// # Errors
    /// Returns a configuration error if validation fails.
    pub fn from_config(mut config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(config = ?config, "runner configured");
        Ok(Self {
            config,
            state: RunState::Configured,
            used: false,
        })
    }

    /// Last state reached.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Configuration the runner was built with.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn advance(&mut self) {
        self.state = self.state.next();
        tracing::info!(state = %self.state, "run state reached");
    }

    fn enter(&mut self, state: RunState) {
        self.state = state;
        tracing::info!(state = %self.state, "run state reached");
    }

    fn take_binary(&mut self) -> Option<Box<dyn BinaryHandler>> {
        if !self.config.has_binary() {
            return None;
        }
        let handler = self.config.binary_handler.take().unwrap_or_else(|| {
            Box::new(
                CargoBinary::new(self.config.binary.clone())
                    .with_stop_timeout(self.config.stop_timeout),
            ) as Box<dyn BinaryHandler>
        });
        Some(handler)
    }

    /// Runs the whole lifecycle.
    ///
    /// Returns `Ok(())` only if every phase, cleanup included, succeeded.
    /// If a test function panicked, cleanup still runs, its failures are
    /// logged, and the panic is resumed on the calling task.
    ///
    /// # Errors
    /// Returns every failure recorded during the run.
    ///
    /// # Panics
    /// Resumes the test function's panic once cleanup has finished.
    pub async fn run(&mut self) -> std::result::Result<(), ErrorSet> {
        if self.used {
            return Err(RunError::config("runner has already been used").into());
        }
        self.used = true;

        let Some(test_runner) = self.config.test_runner.take() else {
            return Err(RunError::config("no test runner configured").into());
        };
        let mut binary = self.take_binary();
        let mut preconditions = std::mem::take(&mut self.config.preconditions);
        let ready = self.config.ready.take();
        let binary_ready = self.config.binary_ready.take();
        let mut errors = ErrorSet::new();

        tracing::info!(
            base = %self.config.binary.base.display(),
            binary = binary.is_some(),
            preconditions = preconditions.len(),
            readiness = ready.is_some(),
            binary_readiness = binary_ready.is_some(),
            test_runner = test_runner.kind(),
            "starting integration run"
        );

        if let Some(handler) = binary.as_mut() {
            tracing::info!(phase = %Phase::Build, "building binary");
            if let Err(err) = handler.build().await {
                tracing::error!(phase = %Phase::Build, error = %err, "build failed");
                errors.push(err);
                return errors.into_result();
            }
        }
        self.advance();

        let started = start_preconditions(&mut preconditions, &mut errors).await;
        let mut panic_payload = None;

        if errors.is_empty() {
            self.advance();

            if let Some(probe) = &ready {
                tracing::info!(phase = %Phase::Readiness, "waiting for readiness");
                if let Err(err) = probe.wait_ready().await {
                    tracing::error!(phase = %Phase::Readiness, error = %err, "not ready");
                    errors.push(err);
                }
            }

            if errors.is_empty() {
                self.advance();
                panic_payload = run_test(
                    binary.as_mut(),
                    binary_ready.as_deref(),
                    test_runner,
                    &mut errors,
                )
                .await;
                self.advance();
            } else {
                tracing::warn!(phase = %Phase::Test, "skipping test body");
            }
        }

        cleanup(binary.as_mut(), &mut preconditions[..started], &mut errors).await;
        self.enter(RunState::CleanedUp);
        self.enter(RunState::Done);

        if let Some(payload) = panic_payload {
            for err in errors.iter() {
                tracing::error!(phase = %err.phase(), error = %err, "failure during cleanup");
            }
            tracing::error!(
                panic = %panic_message(&*payload),
                "test function panicked; resuming after cleanup"
            );
            std::panic::resume_unwind(payload);
        }

        if errors.is_empty() {
            tracing::info!("integration run passed");
        } else {
            tracing::error!(failures = errors.len(), "integration run failed:\n{errors}");
        }
        errors.into_result()
    }

    /// Runs on a fresh multi-threaded runtime, for `harness = false` mains.
    ///
    /// # Errors
    /// Returns every failure recorded during the run, or an I/O error if the
    /// runtime cannot be created.
    pub fn run_blocking(&mut self) -> std::result::Result<(), ErrorSet> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(RunError::from)?;
        runtime.block_on(self.run())
    }
}

/// Starts the binary if configured and waits for it, then runs the test
/// body.
async fn run_test(
    binary: Option<&mut Box<dyn BinaryHandler>>,
    binary_ready: Option<&dyn ReadinessProbe>,
    test_runner: TestRunner,
    errors: &mut ErrorSet,
) -> Option<Box<dyn Any + Send>> {
    if let Some(handler) = binary {
        tracing::info!(phase = %Phase::BinaryStart, "starting binary");
        match handler.run().await {
            Ok(process) => tracing::info!(phase = %Phase::BinaryStart, pid = process.pid, "binary running"),
            Err(err) => {
                tracing::error!(phase = %Phase::BinaryStart, error = %err, "binary failed to start");
                errors.push(err);
                tracing::warn!(phase = %Phase::Test, "skipping test body");
                return None;
            }
        }

        if let Some(probe) = binary_ready {
            tracing::info!(phase = %Phase::Readiness, "waiting for binary readiness");
            if let Err(err) = probe.wait_ready().await {
                tracing::error!(phase = %Phase::Readiness, error = %err, "binary not ready");
                errors.push(err);
                tracing::warn!(phase = %Phase::Test, "skipping test body");
                return None;
            }
        }
    }

    tracing::info!(phase = %Phase::Test, kind = test_runner.kind(), "running tests");
    match test_runner.execute().await {
        TestOutcome::Passed => {
            tracing::info!(phase = %Phase::Test, "tests passed");
            None
        }
        TestOutcome::Failed(err) => {
            tracing::error!(phase = %Phase::Test, error = %err, "tests failed");
            errors.push(err);
            None
        }
        TestOutcome::Panicked(payload) => Some(payload),
    }
}

/// Starts handlers in order, stopping at the first failure.
///
/// Returns how many handlers started; exactly those must be stopped.
async fn start_preconditions(
    preconditions: &mut [Box<dyn Precondition>],
    errors: &mut ErrorSet,
) -> usize {
    let mut started = 0;
    for handler in preconditions.iter_mut() {
        tracing::info!(phase = %Phase::PreconditionStart, precondition = handler.name(), "starting precondition");
        if let Err(err) = handler.start().await {
            tracing::error!(
                phase = %Phase::PreconditionStart,
                precondition = handler.name(),
                error = %err,
                "precondition failed to start; rolling back"
            );
            errors.push(err);
            break;
        }
        started += 1;
    }
    started
}

/// Stops the binary, then every started handler in reverse order.
///
/// Shared by rollback after a failed precondition start and by full
/// cleanup. Every stop is attempted; each failure is recorded.
async fn cleanup(
    binary: Option<&mut Box<dyn BinaryHandler>>,
    started: &mut [Box<dyn Precondition>],
    errors: &mut ErrorSet,
) {
    if let Some(handler) = binary {
        tracing::info!(phase = %Phase::BinaryStop, "stopping binary");
        if let Err(err) = handler.stop().await {
            tracing::warn!(phase = %Phase::BinaryStop, error = %err, "binary stop failed");
            errors.push(err);
        }
    }
    for handler in started.iter_mut().rev() {
        tracing::info!(phase = %Phase::PreconditionStop, precondition = handler.name(), "stopping precondition");
        if let Err(err) = handler.stop().await {
            tracing::warn!(
                phase = %Phase::PreconditionStop,
                precondition = handler.name(),
                error = %err,
                "precondition stop failed"
            );
            errors.push(err);
        }
    }
}

/// Maps a run result to a process exit code.
///
/// `0` on success; the suite's own code when the only failure is a
/// non-zero suite completion; `1` otherwise.
#[must_use]
pub fn exit_code(result: &std::result::Result<(), ErrorSet>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(errors) => match errors.iter().collect::<Vec<_>>().as_slice() {
            [RunError::TestsFailed { code }] => *code,
            _ => FAILURE_EXIT_CODE,
        },
    }
}
