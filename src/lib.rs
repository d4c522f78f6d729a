//! Gauntlet: integration-test lifecycle harness
//!
//! Builds the program under test, brings up its dependencies, waits until
//! the system answers, runs the tests and always tears everything down.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use gauntlet::prelude::*;
//!
//! fn main() {
//!     gauntlet::init_tracing();
//!     let result = IntegrationTestRunner::new([
//!         opts::target("."),
//!         opts::compose("docker-compose.yaml"),
//!         opts::wait_binary_http_ready("http://127.0.0.1:8080/healthz", Duration::from_secs(30)),
//!         opts::test_main(|| async { 0 }),
//!     ])
//!     .map_err(ErrorSet::from)
//!     .and_then(|mut runner| runner.run_blocking());
//!     std::process::exit(exit_code(&result));
//! }
//! ```

pub use gauntlet_core as core;
pub use gauntlet_core::opts;

/// Re-exported so custom collaborators can implement the async traits.
pub use async_trait::async_trait;

/// Environment variable holding the log filter; `RUST_LOG` is the fallback.
pub const LOG_ENV: &str = "GAUNTLET_LOG";

/// Prelude module for common imports.
pub mod prelude {
    pub use gauntlet_core::opts;
    pub use gauntlet_core::{
        BinaryHandler, CargoBinary, ComposeRuntime, ComposeStack, ErrorSet, HttpReadiness,
        IntegrationTestRunner, Phase, Precondition, ReadinessProbe, RunError, RunState, exit_code,
    };
}

/// Installs a `tracing` subscriber writing to stderr.
///
/// The filter comes from `GAUNTLET_LOG`, then `RUST_LOG`, then `info`.
/// Calling it again, or after another subscriber was installed, is a no-op.
pub fn init_tracing() {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|spec| tracing_subscriber::EnvFilter::try_new(spec).ok())
        .or_else(|| tracing_subscriber::EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
