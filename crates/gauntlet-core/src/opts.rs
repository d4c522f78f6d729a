//! Configuration options.
//!
//! An [`Opt`] mutates a [`RunnerConfig`] and may fail. Options are applied in
//! order by [`IntegrationTestRunner::new`](crate::IntegrationTestRunner::new);
//! the first failure aborts configuration before anything is built or
//! started.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use gauntlet_core::{IntegrationTestRunner, opts};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut runner = IntegrationTestRunner::new([
//!     opts::base("."),
//!     opts::target("crates/server"),
//!     opts::run_args(["--port", "8080"]),
//!     opts::compose("docker-compose.yaml"),
//!     // served by a compose service, checked before the server starts
//!     opts::wait_http_ready("http://127.0.0.1:9200/_cluster/health", Duration::from_secs(60)),
//!     // served by the server itself, checked once it is running
//!     opts::wait_binary_http_ready("http://127.0.0.1:8080/healthz", Duration::from_secs(10)),
//!     opts::test_fn(|| async {
//!         // talk to the server here
//!     }),
//! ])?;
//! runner.run().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapters::{ComposeRuntime, ComposeStack};
use crate::binary::{BinaryHandler, parse_env_entry};
use crate::config::{COVER_DIR_ENV, Manifest, RunnerConfig};
use crate::error::{Result, RunError};
use crate::precondition::Precondition;
use crate::readiness::{HttpReadiness, ReadinessProbe};
use crate::test_runner::TestRunner;

/// A single configuration mutation.
pub type Opt = Box<dyn FnOnce(&mut RunnerConfig) -> Result<()> + Send>;

fn opt<F>(f: F) -> Opt
where
    F: FnOnce(&mut RunnerConfig) -> Result<()> + Send + 'static,
{
    Box::new(f)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        RunError::config(format!("cannot resolve base '{}': {e}", path.display()))
    })
}

fn collect_env<I, S>(entries: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    entries
        .into_iter()
        .map(|entry| {
            let entry = entry.into();
            parse_env_entry(&entry)?;
            Ok(entry)
        })
        .collect()
}

/// Sets the base directory, made absolute against the working directory.
pub fn base(path: impl Into<PathBuf>) -> Opt {
    let path = path.into();
    opt(move |cfg| {
        cfg.binary.base = absolute(&path)?;
        Ok(())
    })
}

/// Sets the cargo package to build, relative to base.
pub fn target(path: impl Into<PathBuf>) -> Opt {
    let path = path.into();
    opt(move |cfg| {
        if path.as_os_str().is_empty() {
            return Err(RunError::config("target cannot be empty"));
        }
        cfg.binary.target = Some(path);
        Ok(())
    })
}

/// Sets where the built executable is placed, relative to base.
pub fn output(path: impl Into<PathBuf>) -> Opt {
    let path = path.into();
    opt(move |cfg| {
        cfg.binary.output = Some(path);
        Ok(())
    })
}

/// Appends arguments passed to the binary.
pub fn run_args<I, S>(args: I) -> Opt
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    opt(move |cfg| {
        cfg.binary.run_args.extend(args);
        Ok(())
    })
}

/// Appends extra `cargo build` arguments.
pub fn build_args<I, S>(args: I) -> Opt
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    opt(move |cfg| {
        cfg.binary.build_args.extend(args);
        Ok(())
    })
}

/// Appends `KEY=VALUE` entries to the binary's environment.
pub fn run_env<I, S>(entries: I) -> Opt
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let entries = collect_env(entries);
    opt(move |cfg| {
        cfg.binary.run_env.extend(entries?);
        Ok(())
    })
}

/// Appends `KEY=VALUE` entries to the build environment.
pub fn build_env<I, S>(entries: I) -> Opt
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let entries = collect_env(entries);
    opt(move |cfg| {
        cfg.binary.build_env.extend(entries?);
        Ok(())
    })
}

/// Instruments the build and collects coverage profiles into `dir`.
pub fn cover_dir(dir: impl Into<PathBuf>) -> Opt {
    let dir = dir.into();
    opt(move |cfg| {
        cfg.binary.cover_dir = Some(dir);
        Ok(())
    })
}

/// Like [`cover_dir`], read from `GAUNTLET_COVER_DIR`; no-op when unset.
pub fn cover_dir_from_env() -> Opt {
    opt(|cfg| {
        match std::env::var_os(COVER_DIR_ENV) {
            Some(dir) if !dir.is_empty() => {
                tracing::debug!(dir = ?dir, env = COVER_DIR_ENV, "coverage directory from environment");
                cfg.binary.cover_dir = Some(PathBuf::from(dir));
            }
            _ => {}
        }
        Ok(())
    })
}

/// Grace period between SIGTERM and SIGKILL when stopping the binary.
pub fn stop_timeout(timeout: Duration) -> Opt {
    opt(move |cfg| {
        if timeout.is_zero() {
            return Err(RunError::config("stop timeout must be greater than 0"));
        }
        cfg.stop_timeout = timeout;
        Ok(())
    })
}

/// Runs a whole suite; a non-zero code fails the run.
pub fn test_main<F, Fut>(f: F) -> Opt
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = i32> + Send + 'static,
{
    opt(move |cfg| cfg.set_test_runner(TestRunner::suite(f)))
}

/// Runs a single test function; a panic fails the host test after cleanup.
pub fn test_fn<F, Fut>(f: F) -> Opt
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    opt(move |cfg| cfg.set_test_runner(TestRunner::func(f)))
}

/// Starts a compose stack before the tests; `file` is relative to base.
pub fn compose(file: impl Into<PathBuf>) -> Opt {
    compose_with(file, |stack| stack)
}

/// Like [`compose`], customizing the stack before it is registered.
///
/// ```rust,no_run
/// use gauntlet_core::opts;
///
/// let opt = opts::compose_with("docker-compose.yaml", |stack| {
///     stack.with_services(["db"]).with_env("POSTGRES_PASSWORD", "test")
/// });
/// ```
pub fn compose_with<F>(file: impl Into<PathBuf>, customize: F) -> Opt
where
    F: FnOnce(ComposeStack) -> ComposeStack + Send + 'static,
{
    let file = file.into();
    opt(move |cfg| {
        if file.as_os_str().is_empty() {
            return Err(RunError::config("compose file cannot be empty"));
        }
        let file = cfg.resolve(&file)?;
        cfg.preconditions
            .push(Box::new(customize(ComposeStack::new(file))));
        Ok(())
    })
}

/// Registers any precondition; started in registration order.
pub fn precondition(handler: impl Precondition + 'static) -> Opt {
    opt(move |cfg| {
        cfg.preconditions.push(Box::new(handler));
        Ok(())
    })
}

fn http_readiness(url: String, timeout: Duration) -> Result<HttpReadiness> {
    if url.is_empty() {
        return Err(RunError::config("readiness url cannot be empty"));
    }
    if timeout.is_zero() {
        return Err(RunError::config("readiness timeout must be greater than 0"));
    }
    Ok(HttpReadiness::new(url, timeout))
}

/// Waits until `url` answers `200 OK`, giving up after `timeout`.
///
/// Runs once preconditions are up and before the binary starts, so `url`
/// must belong to a precondition (a compose service, for instance). Use
/// [`wait_binary_http_ready`] for an endpoint served by the binary.
pub fn wait_http_ready(url: impl Into<String>, timeout: Duration) -> Opt {
    let url = url.into();
    opt(move |cfg| {
        cfg.ready = Some(Box::new(http_readiness(url, timeout)?));
        Ok(())
    })
}

/// Waits until the started binary answers `200 OK` on `url`, giving up
/// after `timeout`. The test body runs only once it does.
pub fn wait_binary_http_ready(url: impl Into<String>, timeout: Duration) -> Opt {
    let url = url.into();
    opt(move |cfg| {
        cfg.binary_ready = Some(Box::new(http_readiness(url, timeout)?));
        Ok(())
    })
}

/// Registers a custom readiness probe run before the binary starts,
/// replacing any previous one.
pub fn ready(probe: impl ReadinessProbe + 'static) -> Opt {
    opt(move |cfg| {
        cfg.ready = Some(Box::new(probe));
        Ok(())
    })
}

/// Registers a custom readiness probe run after the binary starts,
/// replacing any previous one.
pub fn binary_ready(probe: impl ReadinessProbe + 'static) -> Opt {
    opt(move |cfg| {
        cfg.binary_ready = Some(Box::new(probe));
        Ok(())
    })
}

/// Replaces the cargo handler with a custom binary handler.
pub fn binary(handler: impl BinaryHandler + 'static) -> Opt {
    opt(move |cfg| {
        cfg.binary_handler = Some(Box::new(handler));
        Ok(())
    })
}

/// Applies a TOML manifest.
///
/// Scalar settings replace earlier values, lists are appended, compose
/// stacks are registered after any already configured.
pub fn manifest(path: impl Into<PathBuf>) -> Opt {
    let path = path.into();
    opt(move |cfg| {
        let manifest = Manifest::load(&path)?;
        apply_manifest(cfg, manifest)
    })
}

fn apply_manifest(cfg: &mut RunnerConfig, manifest: Manifest) -> Result<()> {
    if let Some(base) = manifest.base {
        cfg.binary.base = absolute(&base)?;
    }
    if manifest.target.is_some() {
        cfg.binary.target = manifest.target;
    }
    if manifest.output.is_some() {
        cfg.binary.output = manifest.output;
    }
    if manifest.cover_dir.is_some() {
        cfg.binary.cover_dir = manifest.cover_dir;
    }
    cfg.binary.build_args.extend(manifest.build_args);
    cfg.binary.build_env.extend(manifest.build_env);
    cfg.binary.run_args.extend(manifest.run_args);
    cfg.binary.run_env.extend(manifest.run_env);
    if let Some(timeout) = manifest.stop_timeout {
        cfg.stop_timeout = timeout;
    }

    for entry in manifest.compose {
        let mut stack = ComposeStack::new(cfg.resolve(&entry.file)?).with_services(entry.services);
        for (key, value) in entry.env {
            stack = stack.with_env(key, value);
        }
        if let Some(project) = entry.project {
            stack = stack.with_project_name(project);
        }
        if let Some(runtime) = entry.runtime {
            stack = stack.with_runtime(ComposeRuntime::from_name(&runtime));
        }
        if let Some(wait) = entry.wait {
            stack = stack.with_wait(wait);
        }
        cfg.preconditions.push(Box::new(stack));
    }

    if let Some(readiness) = manifest.readiness {
        cfg.ready = Some(Box::new(HttpReadiness::new(readiness.url, readiness.timeout)));
    }
    if let Some(readiness) = manifest.binary_readiness {
        cfg.binary_ready = Some(Box::new(HttpReadiness::new(readiness.url, readiness.timeout)));
    }
    Ok(())
}
