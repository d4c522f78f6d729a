//! Falsification Tests: Category A - Lifecycle Ordering (F001-F010, F030)

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use gauntlet_core::{IntegrationTestRunner, Phase, RunState, opts};
use gauntlet_test::{CallLog, FakeBinary, FakePrecondition, FakeReadiness};
use proptest::prelude::*;

fn counter() -> (Arc<AtomicU32>, Arc<AtomicU32>) {
    let c = Arc::new(AtomicU32::new(0));
    (Arc::clone(&c), c)
}

// =============================================================================
// F001-F003: Build and start ordering
// =============================================================================

/// F001: A failed build starts no precondition
///
/// # Falsification Attempt
/// Configure three preconditions behind a binary whose build fails; any
/// `start` call refutes the claim.
#[tokio::test]
async fn f001_build_failure_starts_no_precondition() {
    let log = CallLog::new();
    let handlers: Vec<_> = ["db", "cache", "queue"]
        .iter()
        .map(|n| FakePrecondition::new(*n, &log))
        .collect();
    let binary = FakeBinary::new(&log).fail_build("error: expected `;`");

    let mut options = vec![opts::binary(binary.clone())];
    options.extend(handlers.iter().cloned().map(opts::precondition));
    options.push(opts::test_main(|| async { 0 }));
    let mut runner = IntegrationTestRunner::new(options).unwrap();

    let errors = runner.run().await.unwrap_err();
    assert_eq!(log.entries(), ["build"]);
    for h in &handlers {
        assert_eq!(h.start_count(), 0);
        assert_eq!(h.stop_count(), 0);
    }
    assert_eq!(binary.stop_count(), 0, "nothing started, nothing to stop");
    assert!(errors.contains_phase(Phase::Build));
    assert_eq!(runner.state(), RunState::Configured);
}

/// F002: Preconditions start sequentially in configuration order
///
/// # Falsification Attempt
/// Delay the first handler's start; if the second starts before the first
/// finished, starts are not sequential.
#[tokio::test]
async fn f002_preconditions_start_in_order() {
    let log = CallLog::new();
    let mut runner = IntegrationTestRunner::new([
        opts::precondition(
            FakePrecondition::new("first", &log).start_delay(Duration::from_millis(50)),
        ),
        opts::precondition(FakePrecondition::new("second", &log)),
        opts::precondition(FakePrecondition::new("third", &log)),
        opts::test_main(|| async { 0 }),
    ])
    .unwrap();

    runner.run().await.unwrap();
    let entries = log.entries();
    assert_eq!(&entries[..3], ["start:first", "start:second", "start:third"]);
}

/// Outcome of running N handlers where handler k fails to start.
struct RollbackObservation {
    starts: Vec<u32>,
    stops: Vec<u32>,
    stop_order: Vec<String>,
    body_ran: bool,
    single_error: bool,
}

fn observe_rollback(n: usize, k: usize) -> RollbackObservation {
    let log = CallLog::new();
    let handlers: Vec<_> = (1..=n)
        .map(|i| {
            let h = FakePrecondition::new(format!("h{i}"), &log);
            if i == k { h.fail_start("refused") } else { h }
        })
        .collect();
    let (ran, ran_in_body) = counter();

    let mut options: Vec<_> = handlers.iter().cloned().map(opts::precondition).collect();
    options.push(opts::test_main(move || async move {
        ran_in_body.fetch_add(1, Ordering::SeqCst);
        0
    }));
    let mut runner = IntegrationTestRunner::new(options).unwrap();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let errors = runtime.block_on(runner.run()).unwrap_err();

    RollbackObservation {
        starts: handlers.iter().map(FakePrecondition::start_count).collect(),
        stops: handlers.iter().map(FakePrecondition::stop_count).collect(),
        stop_order: log
            .entries()
            .into_iter()
            .filter(|e| e.starts_with("stop:"))
            .collect(),
        body_ran: ran.load(Ordering::SeqCst) > 0,
        single_error: errors.len() == 1 && errors.contains_phase(Phase::PreconditionStart),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// F003: Handler k failing to start rolls back exactly 1..k-1
    ///
    /// # Falsification Attempt
    /// For random N and k, any handler before k without exactly one stop,
    /// or any handler from k on with a stop, refutes the claim.
    #[test]
    fn f003_partial_start_rolls_back_exactly_started(n in 1usize..7, offset in 0usize..7) {
        let k = offset % n + 1;
        let obs = observe_rollback(n, k);

        for i in 0..n {
            let expected_starts = u32::from(i < k);
            let expected_stops = u32::from(i + 1 < k);
            prop_assert_eq!(obs.starts[i], expected_starts, "handler {} starts", i + 1);
            prop_assert_eq!(obs.stops[i], expected_stops, "handler {} stops", i + 1);
        }
        let expected_order: Vec<String> = (1..k).rev().map(|i| format!("stop:h{i}")).collect();
        prop_assert_eq!(obs.stop_order, expected_order);
        prop_assert!(!obs.body_ran);
        prop_assert!(obs.single_error);
    }
}

// =============================================================================
// F004-F007: Unconditional cleanup
// =============================================================================

/// F004: Every started handler and the binary get exactly one stop,
/// whether the suite passes or fails
#[tokio::test]
async fn f004_cleanup_exactly_once_regardless_of_outcome() {
    for code in [0, 1, 101] {
        let log = CallLog::new();
        let binary = FakeBinary::new(&log);
        let a = FakePrecondition::new("a", &log);
        let b = FakePrecondition::new("b", &log);
        let mut runner = IntegrationTestRunner::new([
            opts::binary(binary.clone()),
            opts::precondition(a.clone()),
            opts::precondition(b.clone()),
            opts::test_main(move || async move { code }),
        ])
        .unwrap();

        let result = runner.run().await;
        assert_eq!(result.is_ok(), code == 0, "exit code {code}");
        assert_eq!(binary.stop_count(), 1, "exit code {code}");
        assert_eq!(a.stop_count(), 1, "exit code {code}");
        assert_eq!(b.stop_count(), 1, "exit code {code}");
        assert!(!binary.is_running());
        assert_eq!(runner.state(), RunState::Done);
    }
}

/// F005: Cleanup stops the binary first, then handlers in reverse order
#[tokio::test]
async fn f005_cleanup_order() {
    let log = CallLog::new();
    let mut runner = IntegrationTestRunner::new([
        opts::binary(FakeBinary::new(&log)),
        opts::precondition(FakePrecondition::new("a", &log)),
        opts::precondition(FakePrecondition::new("b", &log)),
        opts::ready(FakeReadiness::ready(&log)),
        opts::test_main(|| async { 0 }),
    ])
    .unwrap();

    runner.run().await.unwrap();
    assert_eq!(
        log.entries(),
        [
            "build",
            "start:a",
            "start:b",
            "ready",
            "run",
            "stop:binary",
            "stop:b",
            "stop:a",
        ]
    );
}

/// F006: A readiness failure skips the body but still cleans up
#[tokio::test]
async fn f006_readiness_failure_full_cleanup() {
    let log = CallLog::new();
    let binary = FakeBinary::new(&log);
    let db = FakePrecondition::new("db", &log);
    let (ran, ran_in_body) = counter();
    let mut runner = IntegrationTestRunner::new([
        opts::binary(binary.clone()),
        opts::precondition(db.clone()),
        opts::ready(FakeReadiness::timing_out(&log, Duration::from_secs(5))),
        opts::test_main(move || async move {
            ran_in_body.fetch_add(1, Ordering::SeqCst);
            0
        }),
    ])
    .unwrap();

    let errors = runner.run().await.unwrap_err();
    assert!(errors.contains_phase(Phase::Readiness));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(binary.run_count(), 0);
    assert_eq!(binary.stop_count(), 1);
    assert_eq!(db.stop_count(), 1);
}

/// F007: A binary that fails to start skips the body but still cleans up
#[tokio::test]
async fn f007_binary_start_failure_full_cleanup() {
    let log = CallLog::new();
    let binary = FakeBinary::new(&log).fail_run("permission denied");
    let db = FakePrecondition::new("db", &log);
    let (ran, ran_in_body) = counter();
    let mut runner = IntegrationTestRunner::new([
        opts::binary(binary.clone()),
        opts::precondition(db.clone()),
        opts::test_fn(move || async move {
            ran_in_body.fetch_add(1, Ordering::SeqCst);
        }),
    ])
    .unwrap();

    let errors = runner.run().await.unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors.contains_phase(Phase::BinaryStart));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(binary.stop_count(), 1);
    assert_eq!(db.stop_count(), 1);
}

// =============================================================================
// F008-F010: Test function shape
// =============================================================================

/// F008: A panicking test function still gets full cleanup, and the panic
/// reaches the caller afterwards
#[tokio::test]
async fn f008_test_fn_panic_resumed_after_cleanup() {
    let log = CallLog::new();
    let binary = FakeBinary::new(&log);
    let db = FakePrecondition::new("db", &log);
    let mut runner = IntegrationTestRunner::new([
        opts::binary(binary.clone()),
        opts::precondition(db.clone()),
        opts::test_fn(|| async {
            assert_eq!(2 + 2, 5, "server returned the wrong answer");
        }),
    ])
    .unwrap();

    let joined = tokio::spawn(async move { runner.run().await }).await;
    let payload = joined.unwrap_err().into_panic();
    let message = gauntlet_core::test_runner::panic_message(&*payload);
    assert!(message.contains("server returned the wrong answer"), "{message}");
    assert_eq!(binary.stop_count(), 1);
    assert_eq!(db.stop_count(), 1);
    assert_eq!(log.entries().last().map(String::as_str), Some("stop:db"));
}

/// F009: A passing test function yields an empty result
#[tokio::test]
async fn f009_passing_test_fn_is_ok() {
    let log = CallLog::new();
    let db = FakePrecondition::new("db", &log);
    let (ran, ran_in_body) = counter();
    let mut runner = IntegrationTestRunner::new([
        opts::precondition(db.clone()),
        opts::test_fn(move || async move {
            ran_in_body.fetch_add(1, Ordering::SeqCst);
        }),
    ])
    .unwrap();

    runner.run().await.unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(db.stop_count(), 1);
}

/// F010: Without a binary configured, the binary phases are skipped
#[tokio::test]
async fn f010_no_binary_phase_without_target() {
    let log = CallLog::new();
    let mut runner = IntegrationTestRunner::new([
        opts::precondition(FakePrecondition::new("db", &log)),
        opts::test_main(|| async { 0 }),
    ])
    .unwrap();

    runner.run().await.unwrap();
    assert_eq!(log.entries(), ["start:db", "stop:db"]);
}

// =============================================================================
// F030: Readiness of the binary under test
// =============================================================================

/// F030: Readiness that depends on the binary only passes when registered as
/// binary readiness
///
/// # Falsification Attempt
/// Gate readiness on the fake binary running. Registered as precondition
/// readiness it must time out without ever starting the binary; registered
/// as binary readiness it must pass, after `run` and before the body.
#[tokio::test]
async fn f030_binary_readiness_waits_for_started_binary() {
    let log = CallLog::new();
    let binary = FakeBinary::new(&log);
    let mut runner = IntegrationTestRunner::new([
        opts::binary(binary.clone()),
        opts::ready(FakeReadiness::until_running(&log, &binary, Duration::from_millis(300))),
        opts::test_main(|| async { 0 }),
    ])
    .unwrap();

    let errors = runner.run().await.unwrap_err();
    assert!(errors.contains_phase(Phase::Readiness));
    assert_eq!(binary.run_count(), 0);
    assert_eq!(log.entries(), ["build", "ready", "stop:binary"]);

    let log = CallLog::new();
    let binary = FakeBinary::new(&log);
    let body_log = log.clone();
    let mut runner = IntegrationTestRunner::new([
        opts::binary(binary.clone()),
        opts::binary_ready(FakeReadiness::until_running(&log, &binary, Duration::from_millis(300))),
        opts::test_fn(move || async move { body_log.record("test") }),
    ])
    .unwrap();

    runner.run().await.unwrap();
    assert_eq!(log.entries(), ["build", "run", "ready", "test", "stop:binary"]);
    assert!(!binary.is_running());
}
