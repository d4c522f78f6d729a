// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # gauntlet-core
//!
//! Integration-test lifecycle orchestration.
//!
//! A run builds the program under test, starts its dependencies, waits until
//! the system answers, runs the tests and then tears everything down again,
//! whatever failed on the way:
//!
//! ```text
//! build → start preconditions → wait ready → run binary → test body
//!       → stop binary → stop preconditions (reverse order) → report
//! ```
//!
//! - [`IntegrationTestRunner`] sequences the phases and aggregates failures
//!   into an [`ErrorSet`]
//! - [`Precondition`] is anything with `start`/`stop`, e.g. a [`ComposeStack`]
//! - [`BinaryHandler`] builds and runs the program, e.g. [`CargoBinary`]
//! - [`ReadinessProbe`] gates the binary start on the preconditions and the
//!   test body on the started binary, e.g. [`HttpReadiness`]
//! - [`TestRunner`] is the body: a whole suite or a single test function
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use gauntlet_core::{IntegrationTestRunner, opts};
//!
//! #[tokio::test]
//! async fn server_answers() {
//!     let mut runner = IntegrationTestRunner::new([
//!         opts::target("."),
//!         opts::compose("docker-compose.yaml"),
//!         opts::wait_binary_http_ready("http://127.0.0.1:8080/healthz", Duration::from_secs(30)),
//!         opts::test_fn(|| async {
//!             // exercise the running server
//!         }),
//!     ])
//!     .unwrap();
//!     runner.run().await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
pub mod binary;
pub mod config;
pub mod error;
pub mod opts;
pub mod precondition;
pub mod readiness;
pub mod runner;
pub mod test_runner;
pub mod types;

pub use adapters::{CargoBinary, ComposeRuntime, ComposeStack, PROFILE_FILE_ENV};
pub use binary::{BinaryHandler, BinarySpec};
pub use config::{COVER_DIR_ENV, DEFAULT_STOP_TIMEOUT, Manifest, RunnerConfig};
pub use error::{ErrorSet, Result, RunError};
pub use opts::Opt;
pub use precondition::Precondition;
pub use readiness::{HttpReadiness, POLL_INTERVAL, ReadinessProbe};
pub use runner::{IntegrationTestRunner, exit_code};
pub use test_runner::{TestOutcome, TestRunner};
pub use types::{Phase, ProcessHandle, RunState};
