//! Binary handler trait and build settings.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ProcessHandle;

/// Everything needed to build and run the program under test.
///
/// Paths are relative to `base` unless already absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinarySpec {
    /// Absolute working directory; relative paths resolve against it.
    pub base: PathBuf,
    /// Build target (a cargo package directory).
    pub target: Option<PathBuf>,
    /// Where the built executable is placed.
    pub output: Option<PathBuf>,
    /// Extra `cargo build` arguments, in order.
    pub build_args: Vec<String>,
    /// Extra build environment as `KEY=VALUE` entries, in order.
    pub build_env: Vec<String>,
    /// Arguments passed to the binary, in order.
    pub run_args: Vec<String>,
    /// Run environment as `KEY=VALUE` entries, in order.
    pub run_env: Vec<String>,
    /// Directory receiving coverage profiles.
    pub cover_dir: Option<PathBuf>,
}

impl BinarySpec {
    /// Creates an empty spec rooted at `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    /// Resolves `path` against the base directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }

    /// Output path, defaulting to `<base>/target/gauntlet/<target file name>`.
    #[must_use]
    pub fn output_path(&self) -> Option<PathBuf> {
        if let Some(output) = &self.output {
            return Some(self.resolve(output));
        }
        let target = self.target.as_ref()?;
        let name = target
            .file_name()
            .or_else(|| self.base.file_name())
            .map_or_else(|| "app".into(), |n| n.to_os_string());
        Some(self.base.join("target").join("gauntlet").join(name))
    }
}

/// Splits a `KEY=VALUE` entry.
///
/// # Errors
/// Returns a configuration error if there is no `=` or the key is empty.
pub fn parse_env_entry(entry: &str) -> Result<(&str, &str)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(crate::error::RunError::config(format!(
            "invalid environment entry '{entry}': expected KEY=VALUE"
        ))),
    }
}

/// Builds the program under test and manages its process.
///
/// # Contract
///
/// - `build` is called once, before any precondition starts.
/// - `run` is called at most once, after readiness.
/// - `stop` is called exactly once during cleanup whenever `build`
///   succeeded, and must succeed as a no-op when `run` never happened.
#[async_trait]
pub trait BinaryHandler: Send + Sync {
    /// Compiles the target into the output path.
    ///
    /// # Errors
    /// Returns [`RunError::Build`](crate::RunError::Build) with diagnostics.
    async fn build(&mut self) -> Result<()>;

    /// Spawns the built binary.
    ///
    /// # Errors
    /// Returns [`RunError::Start`](crate::RunError::Start) if spawning fails.
    async fn run(&mut self) -> Result<ProcessHandle>;

    /// Terminates the running process, if any, and waits for it to exit.
    ///
    /// # Errors
    /// Returns [`RunError::Stop`](crate::RunError::Stop) if termination fails.
    async fn stop(&mut self) -> Result<()>;
}
