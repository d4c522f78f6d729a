//! Concrete collaborators.
//!
//! - [`CargoBinary`]: builds a cargo package and runs it as a child process
//! - [`ComposeStack`]: a `docker compose` / `podman compose` service stack

mod cargo;
mod compose;

pub use cargo::{CargoBinary, PROFILE_FILE_ENV};
pub use compose::{ComposeRuntime, ComposeStack};
