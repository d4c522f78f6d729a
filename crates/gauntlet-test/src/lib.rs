// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # gauntlet-test
//!
//! Test doubles for the gauntlet orchestrator.
//!
//! - [`FakePrecondition`], [`FakeBinary`], [`FakeReadiness`]: in-memory
//!   collaborators with failure toggles and call counters
//! - [`CallLog`]: global call order across fakes
//! - [`ReadinessStub`]: HTTP server that becomes ready after a delay
//!
//! ## Example
//!
//! ```rust,ignore
//! use gauntlet_core::{IntegrationTestRunner, opts};
//! use gauntlet_test::{CallLog, FakeBinary, FakePrecondition};
//!
//! let log = CallLog::new();
//! let db = FakePrecondition::new("db", &log).fail_stop("stuck");
//! let mut runner = IntegrationTestRunner::new([
//!     opts::binary(FakeBinary::new(&log)),
//!     opts::precondition(db.clone()),
//!     opts::test_main(|| async { 0 }),
//! ])?;
//! let errors = runner.run().await.unwrap_err();
//! assert_eq!(db.stop_count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod mocks;
pub mod stub;

pub use error::{Result, TestError};
pub use mocks::{CallLog, FakeBinary, FakePrecondition, FakeReadiness};
pub use stub::ReadinessStub;
