//! Falsification Tests: Category E - Real Toolchain (F027-F029, F031)
//!
//! These tests drive the real `cargo` (taken from `CARGO`, which is set
//! under `cargo test`) against throwaway packages in a temp directory.

use std::path::Path;
use std::time::Duration;

use gauntlet_core::{IntegrationTestRunner, Phase, RunError, opts};
use gauntlet_test::{CallLog, FakePrecondition};

fn write_package(dir: &Path, name: &str, main_rs: &str) {
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(
        dir.join("Cargo.toml"),
        format!(
            "[package]\nname = \"{name}\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n[workspace]\n"
        ),
    )
    .unwrap();
    std::fs::write(dir.join("src/main.rs"), main_rs).unwrap();
}

/// F027: A target that fails to compile yields a build error and no
/// precondition is started
///
/// # Falsification Attempt
/// Point the runner at a package with a type error; any precondition start,
/// or any failure kind other than a build error, refutes the claim.
#[tokio::test]
async fn f027_compile_failure_is_build_error() {
    let dir = tempfile::tempdir().unwrap();
    write_package(
        dir.path(),
        "broken_target",
        "fn main() { let answer: u32 = \"forty-two\"; println!(\"{answer}\"); }\n",
    );

    let log = CallLog::new();
    let db = FakePrecondition::new("db", &log);
    let mut runner = IntegrationTestRunner::new([
        opts::base(dir.path()),
        opts::target("."),
        opts::precondition(db.clone()),
        opts::test_main(|| async { 0 }),
    ])
    .unwrap();

    let errors = runner.run().await.unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors.contains_phase(Phase::Build));
    match errors.iter().next() {
        Some(RunError::Build { output, .. }) => {
            assert!(output.contains("mismatched types"), "diagnostics missing: {output}");
        }
        other => panic!("expected build error, got {other:?}"),
    }
    assert_eq!(db.start_count(), 0);
    assert!(log.entries().is_empty());
}

/// F028: A built binary runs during the test body and is stopped afterwards
#[cfg(unix)]
#[tokio::test]
async fn f028_built_binary_runs_and_is_stopped() {
    let dir = tempfile::tempdir().unwrap();
    write_package(
        dir.path(),
        "sleeper",
        "fn main() { loop { std::thread::sleep(std::time::Duration::from_millis(50)); } }\n",
    );
    let output = dir.path().join("bin/sleeper");

    let mut runner = IntegrationTestRunner::new([
        opts::base(dir.path()),
        opts::target("."),
        opts::output("bin/sleeper"),
        opts::run_env(["SLEEPER_MODE=test"]),
        opts::stop_timeout(Duration::from_secs(2)),
        opts::test_fn({
            let output = output.clone();
            move || async move {
                assert!(output.exists(), "artifact not copied to {}", output.display());
            }
        }),
    ])
    .unwrap();

    runner.run().await.unwrap();
    assert!(output.exists());
}

/// F029: A missing target package fails the build, not the run
#[tokio::test]
async fn f029_missing_package_is_build_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = IntegrationTestRunner::new([
        opts::base(dir.path()),
        opts::target("does-not-exist"),
        opts::test_main(|| async { 0 }),
    ])
    .unwrap();

    let errors = runner.run().await.unwrap_err();
    assert!(errors.contains_phase(Phase::Build));
    assert!(!errors.contains_phase(Phase::BinaryStop));
}

/// Dependency-free server answering every request with `200 OK` on `PORT`.
const HEALTH_SERVER: &str = r#"
use std::io::{Read, Write};

fn main() {
    let port = std::env::var("PORT").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(300));
    let listener = std::net::TcpListener::bind(("127.0.0.1", port.parse::<u16>().unwrap())).unwrap();
    for stream in listener.incoming() {
        let mut stream = stream.unwrap();
        let mut request = [0u8; 1024];
        let _ = stream.read(&mut request);
        let _ = stream.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok");
    }
}
"#;

/// F031: Binary readiness gates the test body on the built server's own
/// health endpoint
///
/// # Falsification Attempt
/// The server binds only after a delay. If the body runs before the server
/// answers, or the readiness check runs before the server starts, the body's own
/// connection attempt fails.
#[cfg(unix)]
#[tokio::test]
async fn f031_binary_readiness_against_built_server() {
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "health_server", HEALTH_SERVER);
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let mut runner = IntegrationTestRunner::new([
        opts::base(dir.path()),
        opts::target("."),
        opts::run_env([format!("PORT={port}")]),
        opts::stop_timeout(Duration::from_secs(2)),
        opts::wait_binary_http_ready(format!("http://127.0.0.1:{port}/healthz"), Duration::from_secs(10)),
        opts::test_fn(move || async move {
            let connected = tokio::net::TcpStream::connect(("127.0.0.1", port)).await;
            assert!(connected.is_ok(), "server not reachable: {connected:?}");
        }),
    ])
    .unwrap();

    runner.run().await.unwrap();
}
