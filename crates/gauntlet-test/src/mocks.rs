//! Fake collaborators.
//!
//! Fakes share their state through an `Arc`, so a clone kept by the test
//! observes calls made on the instance handed to the runner. Every call is
//! also appended to a [`CallLog`] shared between fakes, which records the
//! global call order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gauntlet_core::{
    BinaryHandler, Precondition, ProcessHandle, ReadinessProbe, Result, RunError,
};

/// Ordered record of calls across fakes.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry such as `"start:db"`.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Snapshot of every entry in call order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries equal to `entry`.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Returns true if any entry equals `entry`.
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.count(entry) > 0
    }

    /// Position of the first entry equal to `entry`.
    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }
}

/// Failure toggle with its message.
#[derive(Debug, Default)]
struct Failure {
    enabled: AtomicBool,
    message: parking_lot::RwLock<String>,
}

impl Failure {
    fn set(&self, msg: impl Into<String>) {
        self.enabled.store(true, Ordering::SeqCst);
        *self.message.write() = msg.into();
    }

    fn get(&self) -> Option<String> {
        self.enabled
            .load(Ordering::SeqCst)
            .then(|| self.message.read().clone())
    }
}

#[derive(Debug, Default)]
struct PreconditionState {
    fail_start: Failure,
    fail_stop: Failure,
    start_delay_ms: AtomicU32,
    start_count: AtomicU32,
    stop_count: AtomicU32,
}

/// In-memory precondition.
///
/// Logs `start:<name>` and `stop:<name>` to its [`CallLog`].
#[derive(Debug, Clone)]
pub struct FakePrecondition {
    name: String,
    log: CallLog,
    state: Arc<PreconditionState>,
}

impl FakePrecondition {
    /// Creates a fake that starts and stops successfully.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            state: Arc::new(PreconditionState::default()),
        }
    }

    /// Configures `start` to fail with the given message.
    #[must_use]
    pub fn fail_start(self, msg: impl Into<String>) -> Self {
        self.state.fail_start.set(msg);
        self
    }

    /// Configures `stop` to fail with the given message.
    #[must_use]
    pub fn fail_stop(self, msg: impl Into<String>) -> Self {
        self.state.fail_stop.set(msg);
        self
    }

    /// Makes `start` take the given time before completing.
    #[must_use]
    pub fn start_delay(self, delay: Duration) -> Self {
        let ms = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        self.state.start_delay_ms.store(ms, Ordering::SeqCst);
        self
    }

    /// Number of `start` calls.
    #[must_use]
    pub fn start_count(&self) -> u32 {
        self.state.start_count.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls.
    #[must_use]
    pub fn stop_count(&self) -> u32 {
        self.state.stop_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Precondition for FakePrecondition {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<()> {
        self.state.start_count.fetch_add(1, Ordering::SeqCst);
        self.log.record(format!("start:{}", self.name));
        let delay = self.state.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(delay))).await;
        }
        match self.state.fail_start.get() {
            Some(msg) => Err(RunError::precondition_start(&self.name, msg)),
            None => Ok(()),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.state.stop_count.fetch_add(1, Ordering::SeqCst);
        self.log.record(format!("stop:{}", self.name));
        match self.state.fail_stop.get() {
            Some(msg) => Err(RunError::precondition_stop(&self.name, msg)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct BinaryState {
    fail_build: Failure,
    fail_run: Failure,
    fail_stop: Failure,
    build_count: AtomicU32,
    run_count: AtomicU32,
    stop_count: AtomicU32,
    running: AtomicBool,
}

/// In-memory binary handler.
///
/// Logs `build`, `run` and `stop:binary` to its [`CallLog`].
#[derive(Debug, Clone)]
pub struct FakeBinary {
    pid: u32,
    log: CallLog,
    state: Arc<BinaryState>,
}

impl FakeBinary {
    /// PID reported by a fake that was not given one.
    pub const DEFAULT_PID: u32 = 4242;

    /// Creates a fake that builds, runs and stops successfully.
    #[must_use]
    pub fn new(log: &CallLog) -> Self {
        Self {
            pid: Self::DEFAULT_PID,
            log: log.clone(),
            state: Arc::new(BinaryState::default()),
        }
    }

    /// Sets the PID reported by `run`.
    #[must_use]
    pub const fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Configures `build` to fail with the given compiler output.
    #[must_use]
    pub fn fail_build(self, output: impl Into<String>) -> Self {
        self.state.fail_build.set(output);
        self
    }

    /// Configures `run` to fail with the given message.
    #[must_use]
    pub fn fail_run(self, msg: impl Into<String>) -> Self {
        self.state.fail_run.set(msg);
        self
    }

    /// Configures `stop` to fail with the given message.
    #[must_use]
    pub fn fail_stop(self, msg: impl Into<String>) -> Self {
        self.state.fail_stop.set(msg);
        self
    }

    /// Number of `build` calls.
    #[must_use]
    pub fn build_count(&self) -> u32 {
        self.state.build_count.load(Ordering::SeqCst)
    }

    /// Number of `run` calls.
    #[must_use]
    pub fn run_count(&self) -> u32 {
        self.state.run_count.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls.
    #[must_use]
    pub fn stop_count(&self) -> u32 {
        self.state.stop_count.load(Ordering::SeqCst)
    }

    /// Returns true between a successful `run` and the next `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BinaryHandler for FakeBinary {
    async fn build(&mut self) -> Result<()> {
        self.state.build_count.fetch_add(1, Ordering::SeqCst);
        self.log.record("build");
        match self.state.fail_build.get() {
            Some(output) => Err(RunError::build("fake", output)),
            None => Ok(()),
        }
    }

    async fn run(&mut self) -> Result<ProcessHandle> {
        self.state.run_count.fetch_add(1, Ordering::SeqCst);
        self.log.record("run");
        if let Some(msg) = self.state.fail_run.get() {
            return Err(RunError::start(msg));
        }
        self.state.running.store(true, Ordering::SeqCst);
        Ok(ProcessHandle::new(self.pid))
    }

    async fn stop(&mut self) -> Result<()> {
        self.state.stop_count.fetch_add(1, Ordering::SeqCst);
        self.log.record("stop:binary");
        if let Some(msg) = self.state.fail_stop.get() {
            return Err(RunError::stop(msg));
        }
        self.state.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// How often [`FakeReadiness::until_running`] looks at its binary.
const RUNNING_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
enum Answer {
    Ready,
    TimingOut(Duration),
    UntilRunning(FakeBinary, Duration),
}

/// Readiness probe with a scripted answer.
///
/// Logs `ready` to its [`CallLog`].
#[derive(Debug, Clone)]
pub struct FakeReadiness {
    log: CallLog,
    answer: Answer,
}

impl FakeReadiness {
    /// A probe that succeeds immediately.
    #[must_use]
    pub fn ready(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            answer: Answer::Ready,
        }
    }

    /// A probe that reports a readiness timeout of `timeout`.
    #[must_use]
    pub fn timing_out(log: &CallLog, timeout: Duration) -> Self {
        Self {
            log: log.clone(),
            answer: Answer::TimingOut(timeout),
        }
    }

    /// A probe that succeeds once `binary` is running, or times out after
    /// `timeout`. Stands in for a health endpoint served by the binary.
    #[must_use]
    pub fn until_running(log: &CallLog, binary: &FakeBinary, timeout: Duration) -> Self {
        Self {
            log: log.clone(),
            answer: Answer::UntilRunning(binary.clone(), timeout),
        }
    }
}

#[async_trait]
impl ReadinessProbe for FakeReadiness {
    async fn wait_ready(&self) -> Result<()> {
        self.log.record("ready");
        match &self.answer {
            Answer::Ready => Ok(()),
            Answer::TimingOut(timeout) => Err(RunError::ReadinessTimeout(*timeout)),
            Answer::UntilRunning(binary, timeout) => {
                let deadline = tokio::time::Instant::now() + *timeout;
                while !binary.is_running() {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(RunError::ReadinessTimeout(*timeout));
                    }
                    tokio::time::sleep(RUNNING_POLL).await;
                }
                Ok(())
            }
        }
    }
}
