//! Runner configuration.
//!
//! [`RunnerConfig`] is mutated by an ordered list of [`Opt`](crate::opts::Opt)s
//! and validated once before orchestration starts. A [`Manifest`] is the
//! file-based form of the same settings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::binary::{BinaryHandler, BinarySpec, parse_env_entry};
use crate::error::{Result, RunError};
use crate::precondition::Precondition;
use crate::readiness::ReadinessProbe;
use crate::test_runner::TestRunner;

/// Grace period between SIGTERM and SIGKILL when stopping the binary.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable overriding the coverage directory.
pub const COVER_DIR_ENV: &str = "GAUNTLET_COVER_DIR";

/// Configuration owned by the orchestrator for one run.
pub struct RunnerConfig {
    /// Build/run settings for the program under test.
    pub binary: BinarySpec,
    /// Custom binary handler; replaces the cargo handler when set.
    pub binary_handler: Option<Box<dyn BinaryHandler>>,
    /// Grace period before the binary is killed.
    pub stop_timeout: Duration,
    /// Precondition handlers in start order.
    pub preconditions: Vec<Box<dyn Precondition>>,
    /// Readiness probe run once preconditions are up, before the binary
    /// starts.
    pub ready: Option<Box<dyn ReadinessProbe>>,
    /// Readiness probe run once the binary is running, before the test body.
    pub binary_ready: Option<Box<dyn ReadinessProbe>>,
    /// The test body.
    pub test_runner: Option<TestRunner>,
}

impl RunnerConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: BinarySpec::default(),
            binary_handler: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            preconditions: Vec::new(),
            ready: None,
            binary_ready: None,
            test_runner: None,
        }
    }

    /// Base directory, or the process working directory when unset.
    ///
    /// # Errors
    /// Returns a configuration error if the working directory is unavailable.
    pub fn base(&self) -> Result<PathBuf> {
        if self.binary.base.as_os_str().is_empty() {
            std::path::absolute(".")
                .map_err(|e| RunError::config(format!("resolving working directory failed: {e}")))
        } else {
            Ok(self.binary.base.clone())
        }
    }

    /// Resolves `path` against the base directory.
    ///
    /// # Errors
    /// Returns a configuration error if the base cannot be determined.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.base()?.join(path))
        }
    }

    /// Sets the test runner, refusing to replace an existing one.
    ///
    /// # Errors
    /// Returns a configuration error if a runner is already configured.
    pub fn set_test_runner(&mut self, runner: TestRunner) -> Result<()> {
        if let Some(existing) = &self.test_runner {
            return Err(RunError::config(format!(
                "test runner already configured ({}); cannot also set {}",
                existing.kind(),
                runner.kind()
            )));
        }
        self.test_runner = Some(runner);
        Ok(())
    }

    /// Returns true if a binary will be built and run.
    #[must_use]
    pub fn has_binary(&self) -> bool {
        self.binary_handler.is_some() || self.binary.target.is_some()
    }

    /// Validates the configuration after all options were applied.
    ///
    /// # Errors
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&mut self) -> Result<()> {
        if self.binary.base.as_os_str().is_empty() {
            self.binary.base = self.base()?;
        }
        if !self.binary.base.is_absolute() {
            return Err(RunError::config(format!(
                "base '{}' is not absolute",
                self.binary.base.display()
            )));
        }
        if self.test_runner.is_none() {
            return Err(RunError::config(
                "no test runner configured; set exactly one of test_main or test_fn",
            ));
        }
        if !self.has_binary() {
            let stray = [
                (self.binary.output.is_some(), "output"),
                (!self.binary.build_args.is_empty(), "build args"),
                (!self.binary.run_args.is_empty(), "run args"),
                (!self.binary.build_env.is_empty(), "build env"),
                (!self.binary.run_env.is_empty(), "run env"),
                (self.binary.cover_dir.is_some(), "cover dir"),
            ];
            if let Some((_, what)) = stray.iter().find(|(set, _)| *set) {
                return Err(RunError::config(format!("{what} set without a build target")));
            }
            if self.binary_ready.is_some() {
                return Err(RunError::config("binary readiness set without a build target"));
            }
        }
        for entry in self.binary.build_env.iter().chain(&self.binary.run_env) {
            parse_env_entry(entry)?;
        }
        if self.stop_timeout.is_zero() {
            return Err(RunError::config("stop timeout must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("binary", &self.binary)
            .field("custom_binary_handler", &self.binary_handler.is_some())
            .field("stop_timeout", &self.stop_timeout)
            .field(
                "preconditions",
                &self.preconditions.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("ready", &self.ready.is_some())
            .field("binary_ready", &self.binary_ready.is_some())
            .field("test_runner", &self.test_runner)
            .finish()
    }
}

/// File-based run settings.
///
/// Relative `base` is resolved against the directory holding the manifest.
/// Without `base`, the base configured before the manifest is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Base directory.
    #[serde(default)]
    pub base: Option<PathBuf>,
    /// Build target.
    #[serde(default)]
    pub target: Option<PathBuf>,
    /// Output binary path.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Extra build arguments.
    #[serde(default)]
    pub build_args: Vec<String>,
    /// Extra build environment.
    #[serde(default)]
    pub build_env: Vec<String>,
    /// Run arguments.
    #[serde(default)]
    pub run_args: Vec<String>,
    /// Run environment.
    #[serde(default)]
    pub run_env: Vec<String>,
    /// Coverage directory.
    #[serde(default)]
    pub cover_dir: Option<PathBuf>,
    /// Grace period before the binary is killed.
    #[serde(default, with = "humantime_serde_opt")]
    pub stop_timeout: Option<Duration>,
    /// Compose stacks started in order.
    #[serde(default)]
    pub compose: Vec<ComposeEntry>,
    /// HTTP readiness check run before the binary starts.
    #[serde(default)]
    pub readiness: Option<ReadinessEntry>,
    /// HTTP readiness check run after the binary starts.
    #[serde(default)]
    pub binary_readiness: Option<ReadinessEntry>,
}

/// One compose stack in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposeEntry {
    /// Compose file, relative to base.
    pub file: PathBuf,
    /// Services to bring up; all when empty.
    #[serde(default)]
    pub services: Vec<String>,
    /// Environment overrides passed to the compose CLI.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Compose project name.
    #[serde(default)]
    pub project: Option<String>,
    /// `docker`, `podman` or the path of another compose-capable CLI.
    #[serde(default)]
    pub runtime: Option<String>,
    /// Whether `up` waits for services; on when absent.
    #[serde(default)]
    pub wait: Option<bool>,
}

/// HTTP readiness settings in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadinessEntry {
    /// URL expected to answer `200 OK`.
    pub url: String,
    /// Deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl ReadinessEntry {
    fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(RunError::config("readiness url cannot be empty"));
        }
        if self.timeout.is_zero() {
            return Err(RunError::config("readiness timeout must be greater than 0"));
        }
        Ok(())
    }
}

impl Manifest {
    /// Parses a manifest from TOML text.
    ///
    /// # Errors
    /// Returns a configuration error if parsing or validation fails.
    pub fn from_toml(text: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(text)
            .map_err(|e| RunError::config(format!("failed to parse manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Loads a manifest file, resolving a relative `base` against the
    /// manifest's directory. An absent `base` stays absent.
    ///
    /// # Errors
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RunError::config(format!("failed to read manifest '{}': {e}", path.display()))
        })?;
        let mut manifest = Self::from_toml(&content)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.base = manifest.base.take().map(|base| {
            if base.is_absolute() {
                base
            } else {
                dir.join(base)
            }
        });
        Ok(manifest)
    }

    /// Validates the manifest.
    ///
    /// # Errors
    /// Returns a configuration error if the manifest is inconsistent.
    pub fn validate(&self) -> Result<()> {
        if self
            .target
            .as_ref()
            .is_some_and(|t| t.as_os_str().is_empty())
        {
            return Err(RunError::config("target cannot be empty"));
        }
        for entry in self.build_env.iter().chain(&self.run_env) {
            parse_env_entry(entry)?;
        }
        for compose in &self.compose {
            if compose.file.as_os_str().is_empty() {
                return Err(RunError::config("compose file cannot be empty"));
            }
            if compose.runtime.as_deref() == Some("") {
                return Err(RunError::config("compose runtime cannot be empty"));
            }
        }
        for readiness in self.readiness.iter().chain(&self.binary_readiness) {
            readiness.validate()?;
        }
        if self.stop_timeout.is_some_and(|t| t.is_zero()) {
            return Err(RunError::config("stop timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde helper for optional humantime durations.
mod humantime_serde_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::humantime_serde::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
