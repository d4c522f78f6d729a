//! Cargo binary handler.
//!
//! Builds a cargo package with `cargo build`, copies the produced executable
//! to the configured output path and runs it as a native child process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::binary::{BinaryHandler, BinarySpec, parse_env_entry};
use crate::config::DEFAULT_STOP_TIMEOUT;
use crate::error::{Result, RunError};
use crate::types::ProcessHandle;

#[cfg(unix)]
use nix::sys::signal::{Signal as NixSignal, kill as nix_kill};
#[cfg(unix)]
use nix::unistd::Pid;

/// Environment variable naming the LLVM coverage profile pattern.
pub const PROFILE_FILE_ENV: &str = "LLVM_PROFILE_FILE";

/// Profile file name pattern; `%p` is the PID, `%m` the binary signature.
const PROFILE_FILE_PATTERN: &str = "gauntlet-%p-%m.profraw";

/// Binary handler driving `cargo build` and a native child process.
#[derive(Debug)]
pub struct CargoBinary {
    spec: BinarySpec,
    cargo: PathBuf,
    stop_timeout: Duration,
    artifact: Option<PathBuf>,
    child: Option<Child>,
}

impl CargoBinary {
    /// Creates a handler for `spec`.
    ///
    /// Uses the `CARGO` environment variable when set (it is inside
    /// `cargo test`), otherwise `cargo` from `PATH`.
    #[must_use]
    pub fn new(spec: BinarySpec) -> Self {
        let cargo = std::env::var_os("CARGO").map_or_else(|| PathBuf::from("cargo"), PathBuf::from);
        Self {
            spec,
            cargo,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            artifact: None,
            child: None,
        }
    }

    /// Sets the grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Overrides the cargo executable.
    #[must_use]
    pub fn with_cargo(mut self, cargo: impl Into<PathBuf>) -> Self {
        self.cargo = cargo.into();
        self
    }

    /// Returns the spec this handler was built from.
    #[must_use]
    pub const fn spec(&self) -> &BinarySpec {
        &self.spec
    }

    /// Path of the built artifact, once `build` succeeded.
    #[must_use]
    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// PID of the running process, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Path to the package manifest for the target.
    fn manifest_path(&self, target: &Path) -> PathBuf {
        let resolved = self.spec.resolve(target);
        if resolved.file_name().is_some_and(|n| n == "Cargo.toml") {
            resolved
        } else {
            resolved.join("Cargo.toml")
        }
    }

    /// Build environment, with coverage instrumentation appended to
    /// `RUSTFLAGS` when a coverage directory is configured.
    fn build_env(&self) -> Result<HashMap<String, String>> {
        let mut env = HashMap::new();
        for entry in &self.spec.build_env {
            let (key, value) = parse_env_entry(entry)?;
            env.insert(key.to_string(), value.to_string());
        }
        if self.spec.cover_dir.is_some() {
            let base = env
                .get("RUSTFLAGS")
                .cloned()
                .or_else(|| std::env::var("RUSTFLAGS").ok())
                .unwrap_or_default();
            let flags = if base.trim().is_empty() {
                "-C instrument-coverage".to_string()
            } else {
                format!("{} -C instrument-coverage", base.trim())
            };
            env.insert("RUSTFLAGS".to_string(), flags);
        }
        Ok(env)
    }

    /// Run environment, including the coverage profile location.
    fn run_env(&self) -> Result<Vec<(String, String)>> {
        let mut env = Vec::with_capacity(self.spec.run_env.len() + 1);
        for entry in &self.spec.run_env {
            let (key, value) = parse_env_entry(entry)?;
            env.push((key.to_string(), value.to_string()));
        }
        if let Some(dir) = &self.spec.cover_dir {
            let dir = self.spec.resolve(dir);
            env.push((
                PROFILE_FILE_ENV.to_string(),
                dir.join(PROFILE_FILE_PATTERN).display().to_string(),
            ));
        }
        Ok(env)
    }

    /// Arguments passed to `cargo`.
    fn build_args(&self, manifest: &Path) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--manifest-path".to_string(),
            manifest.display().to_string(),
            "--message-format=json-render-diagnostics".to_string(),
        ];
        args.extend(self.spec.build_args.iter().cloned());
        args
    }

    /// Sends SIGTERM; a process that is already gone counts as terminated.
    #[cfg(unix)]
    fn terminate(_child: &mut Child, pid: u32) -> Result<()> {
        match nix_kill(Pid::from_raw(pid as i32), NixSignal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(RunError::stop(format!("kill({pid}, SIGTERM) failed: {e}"))),
        }
    }

    /// Kills outright; there is no graceful signal here.
    #[cfg(not(unix))]
    fn terminate(child: &mut Child, pid: u32) -> Result<()> {
        child
            .start_kill()
            .map_err(|e| RunError::stop(format!("failed to kill pid {pid}: {e}")))
    }
}

/// Picks the last executable reported by `cargo build --message-format=json`.
pub(crate) fn find_executable(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter(|msg| msg.get("reason").and_then(|r| r.as_str()) == Some("compiler-artifact"))
        .filter_map(|msg| {
            msg.get("executable")
                .and_then(|e| e.as_str())
                .map(PathBuf::from)
        })
        .last()
}

#[async_trait]
impl BinaryHandler for CargoBinary {
    async fn build(&mut self) -> Result<()> {
        let target = self
            .spec
            .target
            .clone()
            .ok_or_else(|| RunError::config("no build target configured"))?;
        let output = self
            .spec
            .output_path()
            .ok_or_else(|| RunError::config("no output path configured"))?;
        let manifest = self.manifest_path(&target);
        let target_name = target.display().to_string();

        tracing::info!(target = %target_name, manifest = %manifest.display(), "building target");

        let result = Command::new(&self.cargo)
            .args(self.build_args(&manifest))
            .envs(self.build_env()?)
            .current_dir(&self.spec.base)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                RunError::build(
                    &target_name,
                    format!("failed to invoke {}: {e}", self.cargo.display()),
                )
            })?;

        let stdout = String::from_utf8_lossy(&result.stdout);
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            tracing::warn!(target = %target_name, status = %result.status, "build failed");
            return Err(RunError::build(&target_name, stderr.trim().to_string()));
        }

        let executable = find_executable(&stdout).ok_or_else(|| {
            RunError::build(&target_name, "cargo produced no executable artifact")
        })?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RunError::build(
                    &target_name,
                    format!("failed to create '{}': {e}", parent.display()),
                )
            })?;
        }
        tokio::fs::copy(&executable, &output).await.map_err(|e| {
            RunError::build(
                &target_name,
                format!(
                    "failed to copy '{}' to '{}': {e}",
                    executable.display(),
                    output.display()
                ),
            )
        })?;

        tracing::info!(target = %target_name, output = %output.display(), "target built");
        self.artifact = Some(output);
        Ok(())
    }

    async fn run(&mut self) -> Result<ProcessHandle> {
        if let Some(pid) = self.pid() {
            return Err(RunError::start(format!("binary already running as pid {pid}")));
        }
        let path = self
            .artifact
            .clone()
            .or_else(|| self.spec.output_path())
            .ok_or_else(|| RunError::start("no binary to run"))?;
        if !path.exists() {
            return Err(RunError::start(format!(
                "binary '{}' does not exist; build it first",
                path.display()
            )));
        }

        if let Some(dir) = &self.spec.cover_dir {
            let dir = self.spec.resolve(dir);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                RunError::start(format!(
                    "failed to create coverage dir '{}': {e}",
                    dir.display()
                ))
            })?;
        }

        let child = Command::new(&path)
            .args(&self.spec.run_args)
            .envs(self.run_env()?)
            .current_dir(&self.spec.base)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunError::start(format!("failed to spawn '{}': {e}", path.display())))?;

        let pid = child
            .id()
            .ok_or_else(|| RunError::start("process exited before its PID was read"))?;

        tracing::info!(pid = pid, binary = %path.display(), "started binary under test");
        self.child = Some(child);
        Ok(ProcessHandle::new(pid))
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(status = %status, "binary had already exited");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => return Err(RunError::stop(format!("failed to query process: {e}"))),
        }

        let Some(pid) = child.id() else {
            return Ok(());
        };

        tracing::info!(pid = pid, timeout = ?self.stop_timeout, "stopping binary");
        Self::terminate(&mut child, pid)?;

        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(pid = pid, status = %status, "binary stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(RunError::stop(format!("waiting for pid {pid} failed: {e}"))),
            Err(_) => {
                tracing::warn!(pid = pid, "graceful stop timed out, sending SIGKILL");
                child
                    .kill()
                    .await
                    .map_err(|e| RunError::stop(format!("failed to kill pid {pid}: {e}")))?;
                tracing::info!(pid = pid, "binary killed");
                Ok(())
            }
        }
    }
}
