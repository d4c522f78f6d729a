//! Whole-suite integration run against a compose stack.
//!
//! Build as a `harness = false` test target or run directly:
//!
//! ```bash
//! GAUNTLET_LOG=debug cargo run --example compose_suite -- path/to/app
//! ```
//!
//! Expects `<app>/docker-compose.yaml` for the app's dependencies, and the
//! app itself serving `GET /healthz` on port 8080 once it is running.

use std::time::Duration;

use gauntlet::prelude::*;
use reqwest::StatusCode;

const BASE_URL: &str = "http://127.0.0.1:8080";

async fn suite() -> i32 {
    let client = reqwest::Client::new();
    let mut failures = 0;
    for (path, expected) in [("/healthz", StatusCode::OK), ("/missing", StatusCode::NOT_FOUND)] {
        match client.get(format!("{BASE_URL}{path}")).send().await {
            Ok(response) if response.status() == expected => {
                println!("ok    GET {path} -> {}", response.status());
            }
            Ok(response) => {
                println!("FAIL  GET {path} -> {} (expected {expected})", response.status());
                failures += 1;
            }
            Err(e) => {
                println!("FAIL  GET {path}: {e}");
                failures += 1;
            }
        }
    }
    failures
}

fn main() {
    gauntlet::init_tracing();
    let app = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());

    let result = IntegrationTestRunner::new([
        opts::base(app),
        opts::target("."),
        opts::cover_dir_from_env(),
        // `up --wait` holds until the services report healthy.
        opts::compose_with("docker-compose.yaml", |stack| stack.with_wait(true)),
        opts::wait_binary_http_ready(format!("{BASE_URL}/healthz"), Duration::from_secs(60)),
        opts::test_main(suite),
    ])
    .map_err(ErrorSet::from)
    .and_then(|mut runner| runner.run_blocking());

    if let Err(errors) = &result {
        eprintln!("{errors}");
    }
    std::process::exit(exit_code(&result));
}
