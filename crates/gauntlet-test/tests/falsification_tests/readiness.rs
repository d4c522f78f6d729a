//! Falsification Tests: Category B - Readiness (F011-F015)

use std::time::{Duration, Instant};

use gauntlet_core::{HttpReadiness, IntegrationTestRunner, Phase, ReadinessProbe, RunError, opts};
use gauntlet_test::{CallLog, FakePrecondition, ReadinessStub};

/// F011: A server ready after 350 ms is observed within a 1 s timeout
///
/// # Falsification Attempt
/// Serve 503 for 350 ms then 200; a timeout, or success before the server
/// turned ready, refutes the claim.
#[tokio::test]
async fn f011_eventual_200_is_observed_before_timeout() {
    let stub = ReadinessStub::ready_after(Duration::from_millis(350)).unwrap();
    let probe = HttpReadiness::new(stub.url(), Duration::from_secs(1));

    let start = Instant::now();
    probe.wait_ready().await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "ready too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "ready too late: {elapsed:?}");
    assert!(stub.hits() >= 2, "non-200 answers must be retried");
}

/// F012: A server that never answers 200 times out after about 300 ms
///
/// # Falsification Attempt
/// Serve 503 forever with a 300 ms timeout; giving up before 300 ms or long
/// after it refutes the claim.
#[tokio::test]
async fn f012_never_ready_times_out_on_deadline() {
    let stub = ReadinessStub::never_ready().unwrap();
    let probe = HttpReadiness::new(stub.url(), Duration::from_millis(300));

    let start = Instant::now();
    let err = probe.wait_ready().await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, RunError::ReadinessTimeout(t) if t == Duration::from_millis(300)));
    assert!(err.to_string().contains("300ms"), "message must name the timeout: {err}");
    assert!(elapsed >= Duration::from_millis(300), "gave up early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(900), "overran deadline: {elapsed:?}");
}

/// F013: Probes are spaced by the poll interval, not issued in a busy loop
#[tokio::test]
async fn f013_poll_interval_is_respected() {
    let stub = ReadinessStub::never_ready().unwrap();
    let probe = HttpReadiness::new(stub.url(), Duration::from_millis(500));
    let _ = probe.wait_ready().await;

    // 500 ms at 100 ms intervals allows at most one probe per interval
    // plus the initial one and the one past the deadline.
    let hits = stub.hits();
    assert!((3..=8).contains(&hits), "unexpected probe count {hits}");
}

/// F014: Connection refusals count as "not ready yet" until the server
/// appears
#[tokio::test]
async fn f014_connection_refused_is_not_fatal() {
    // Reserve a port, release it, and start the server there later.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = format!("http://127.0.0.1:{port}/");
    let probe = HttpReadiness::new(url, Duration::from_secs(2));

    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let app = axum::Router::new().route("/", axum::routing::get(|| async { "ok" }));
        axum::serve(listener, app).await.unwrap();
    });

    probe.wait_ready().await.unwrap();
    server.abort();
}

/// F015: A readiness timeout inside a run is reported with its phase and
/// every started precondition is stopped
#[tokio::test]
async fn f015_runner_reports_readiness_timeout() {
    let stub = ReadinessStub::never_ready().unwrap();
    let log = CallLog::new();
    let db = FakePrecondition::new("db", &log);
    let mut runner = IntegrationTestRunner::new([
        opts::precondition(db.clone()),
        opts::wait_http_ready(stub.url(), Duration::from_millis(200)),
        opts::test_main(|| async { 0 }),
    ])
    .unwrap();

    let errors = runner.run().await.unwrap_err();
    assert!(errors.contains_phase(Phase::Readiness));
    assert!(errors.to_string().contains("[readiness]"));
    assert_eq!(db.stop_count(), 1);
}
