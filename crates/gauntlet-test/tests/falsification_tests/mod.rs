//! Falsification tests for gauntlet.
//!
//! Each test attempts to refute one claim about the orchestrator. A passing
//! test means the claim survived the attempt.

// Allow test-specific patterns that are denied in production code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod build;
mod lifecycle;
mod readiness;
