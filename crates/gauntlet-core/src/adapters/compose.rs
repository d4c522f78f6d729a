//! Compose stack precondition.
//!
//! Drives `docker compose` (or `podman compose`) through its CLI. The stack
//! is brought up detached before the tests and torn down with its volumes
//! afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Result, RunError};
use crate::precondition::Precondition;

/// Number of log lines per service attached to a failed start.
const LOG_TAIL_LINES: &str = "200";

/// Container runtime providing the `compose` subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ComposeRuntime {
    /// `docker compose`
    #[default]
    Docker,
    /// `podman compose`
    Podman,
    /// Any CLI accepting `<program> compose ...`.
    Custom(PathBuf),
}

impl ComposeRuntime {
    /// Maps `docker` and `podman` to their variants; anything else is taken
    /// as the path of a custom CLI.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "docker" => Self::Docker,
            "podman" => Self::Podman,
            other => Self::Custom(PathBuf::from(other)),
        }
    }

    /// Returns the CLI program for this runtime.
    fn program(&self) -> &Path {
        match self {
            Self::Docker => Path::new("docker"),
            Self::Podman => Path::new("podman"),
            Self::Custom(path) => path,
        }
    }
}

/// A compose-defined service stack started as a unit.
#[derive(Debug, Clone)]
pub struct ComposeStack {
    file: PathBuf,
    project: String,
    runtime: ComposeRuntime,
    env: BTreeMap<String, String>,
    services: Vec<String>,
    wait: bool,
    started: bool,
}

impl ComposeStack {
    /// Creates a stack for the given compose file with a unique project name.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            file: file.into(),
            project: format!("gauntlet-{}", &id[..8]),
            runtime: ComposeRuntime::default(),
            env: BTreeMap::new(),
            services: Vec::new(),
            wait: true,
            started: false,
        }
    }

    /// Adds an environment override visible to compose interpolation.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Brings up only the named services (and their dependencies).
    #[must_use]
    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services.extend(services.into_iter().map(Into::into));
        self
    }

    /// Sets the compose project name.
    #[must_use]
    pub fn with_project_name(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Sets the container runtime.
    #[must_use]
    pub fn with_runtime(mut self, runtime: ComposeRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    /// Whether `up` waits for services to be running/healthy (default on).
    #[must_use]
    pub const fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Returns the compose file.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Returns the project name.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Returns true between a successful start and the following stop.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Arguments shared by every compose invocation.
    fn base_args(&self) -> Vec<String> {
        vec![
            "compose".to_string(),
            "-f".to_string(),
            self.file.display().to_string(),
            "-p".to_string(),
            self.project.clone(),
        ]
    }

    fn up_args(&self) -> Vec<String> {
        let mut args = self.base_args();
        args.push("up".to_string());
        args.push("-d".to_string());
        if self.wait {
            args.push("--wait".to_string());
        }
        args.extend(self.services.iter().cloned());
        args
    }

    fn down_args(&self) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["down", "--volumes", "--remove-orphans"]
                .iter()
                .map(|s| (*s).to_string()),
        );
        args
    }

    fn logs_args(&self) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["logs", "--no-color", "--tail", LOG_TAIL_LINES]
                .iter()
                .map(|s| (*s).to_string()),
        );
        args
    }

    async fn invoke(&self, args: &[String]) -> std::io::Result<Output> {
        let mut cmd = Command::new(self.runtime.program());
        cmd.args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = self.file.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        cmd.output().await
    }

    /// Fetches recent service logs; empty on failure.
    pub async fn logs(&self) -> String {
        match self.invoke(&self.logs_args()).await {
            Ok(out) => String::from_utf8_lossy(&out.stdout).trim().to_string(),
            Err(e) => {
                tracing::debug!(project = %self.project, error = %e, "failed to fetch compose logs");
                String::new()
            }
        }
    }

    /// Removes whatever a failed `up` left behind.
    async fn rollback(&self) {
        match self.invoke(&self.down_args()).await {
            Ok(out) if out.status.success() => {
                tracing::debug!(project = %self.project, "rolled back partial compose start");
            }
            Ok(out) => tracing::warn!(
                project = %self.project,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "compose rollback failed"
            ),
            Err(e) => tracing::warn!(project = %self.project, error = %e, "compose rollback failed"),
        }
    }
}

#[async_trait]
impl Precondition for ComposeStack {
    fn name(&self) -> &str {
        &self.project
    }

    async fn start(&mut self) -> Result<()> {
        let cli = self.runtime.program().display().to_string();
        tracing::info!(
            project = %self.project,
            file = %self.file.display(),
            services = ?self.services,
            "starting compose stack"
        );

        let output = self.invoke(&self.up_args()).await.map_err(|e| {
            RunError::precondition_start(&self.project, format!("{cli} compose up failed: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let logs = self.logs().await;
            self.rollback().await;
            let message = if logs.is_empty() {
                format!("{cli} compose up failed: {stderr}")
            } else {
                format!("{cli} compose up failed: {stderr}\n--- service logs ---\n{logs}")
            };
            return Err(RunError::precondition_start(&self.project, message));
        }

        self.started = true;
        tracing::info!(project = %self.project, "compose stack is up");
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        let cli = self.runtime.program().display().to_string();
        tracing::info!(project = %self.project, "stopping compose stack");

        let output = self.invoke(&self.down_args()).await.map_err(|e| {
            RunError::precondition_stop(&self.project, format!("{cli} compose down failed: {e}"))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunError::precondition_stop(
                &self.project,
                format!("{cli} compose down failed: {}", stderr.trim()),
            ));
        }

        self.started = false;
        tracing::info!(project = %self.project, "compose stack is down");
        Ok(())
    }
}
