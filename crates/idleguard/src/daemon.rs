//! Steady-state operation for idleguard.
//!
//! [`run`] registers the targets, rewrites them every interval, and on a
//! shutdown request forwards the signal and tears everything down once
//! through [`DaemonContext`].

use crate::config::Config;
use crate::lock::InstanceLock;
use crate::logging;
use crate::shutdown::{self, ShutdownError, ShutdownHandle};
use crate::targets::{RegistryError, TargetRegistry};
use nix::sys::signal::Signal;
use std::time::Duration;
use thiserror::Error;

/// Errors that stop the daemon before it reaches steady state.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Signal listeners could not be installed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    /// No target could be created.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What a completed cleanup removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    /// Target files released.
    pub targets_removed: usize,
    /// Whether a held pidfile was released.
    pub pidfile_removed: bool,
}

/// Everything the daemon owns for its lifetime.
///
/// Cleanup runs at most once, either explicitly through
/// [`DaemonContext::cleanup`] or when the context is dropped.
#[derive(Debug)]
pub struct DaemonContext {
    registry: TargetRegistry,
    lock: Option<InstanceLock>,
    cleaned: bool,
}

impl DaemonContext {
    /// Take ownership of the registry and, in detached mode, the lock.
    #[must_use]
    pub const fn new(registry: TargetRegistry, lock: Option<InstanceLock>) -> Self {
        Self {
            registry,
            lock,
            cleaned: false,
        }
    }

    /// Registered targets.
    #[must_use]
    pub const fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Whether cleanup has already run.
    #[must_use]
    pub const fn is_cleaned(&self) -> bool {
        self.cleaned
    }

    /// Remove every owned target, then release the pidfile.
    ///
    /// Returns `None` if cleanup already ran.
    pub fn cleanup(&mut self) -> Option<CleanupReport> {
        if self.cleaned {
            return None;
        }
        self.cleaned = true;

        let targets_removed = self.registry.release();
        let pidfile_removed = match self.lock.take() {
            Some(mut lock) => match lock.release() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to release instance lock");
                    false
                }
            },
            None => false,
        };
        Some(CleanupReport {
            targets_removed,
            pidfile_removed,
        })
    }
}

impl Drop for DaemonContext {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// How the rewrite loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Signal that requested shutdown.
    pub signal: Signal,
    /// Completed rewrite cycles.
    pub cycles: u64,
}

/// Sleep for `d` or return early if shutdown is requested.
///
/// Returns the shutdown cause if one arrived.
async fn sleep_or_shutdown(shutdown: &mut ShutdownHandle, d: Duration) -> Option<Signal> {
    tokio::select! {
        biased;
        signal = shutdown.requested() => Some(signal),
        () = tokio::time::sleep(d) => None,
    }
}

/// Rewrite every owned target once per `interval` until shutdown.
///
/// The first rewrite happens one full interval after the loop starts. Per
/// target failures never end the loop; only a shutdown request does.
pub async fn touch_loop(
    registry: &TargetRegistry,
    interval: Duration,
    shutdown: &mut ShutdownHandle,
) -> LoopOutcome {
    let mut cycles = 0;
    loop {
        if let Some(signal) = sleep_or_shutdown(shutdown, interval).await {
            return LoopOutcome { signal, cycles };
        }
        registry.rewrite_all();
        cycles += 1;
    }
}

/// Start the daemon with the provided configuration.
///
/// Installs the signal listeners for `config.mode` before initialising
/// logging, so a held pidfile is covered by a listener as early as possible,
/// then runs until a termination signal arrives. Returns that signal after
/// cleanup.
///
/// # Errors
///
/// Returns [`DaemonError`] if signal listeners cannot be installed or no
/// target can be created. The lock is released in either case.
pub async fn run(config: &Config, lock: Option<InstanceLock>) -> Result<Signal, DaemonError> {
    let shutdown = shutdown::install(config.mode);
    logging::init(config.mode);
    let shutdown = shutdown?;
    tracing::debug!(mode = ?config.mode, "signal handlers installed");
    run_until_shutdown(config, lock, shutdown).await
}

/// Run with an externally supplied shutdown handle.
///
/// # Errors
///
/// Returns [`DaemonError::Registry`] if no target can be created.
pub async fn run_until_shutdown(
    config: &Config,
    lock: Option<InstanceLock>,
    mut shutdown: ShutdownHandle,
) -> Result<Signal, DaemonError> {
    let registry = TargetRegistry::register(&config.targets)?;
    let mut ctx = DaemonContext::new(registry, lock);
    tracing::info!(
        mode = ?config.mode,
        targets = ctx.registry().owned_count(),
        interval_secs = config.interval_secs,
        "idleguard running"
    );

    let outcome = touch_loop(ctx.registry(), config.interval(), &mut shutdown).await;
    shutdown.propagate(outcome.signal);
    if let Some(report) = ctx.cleanup() {
        tracing::info!(
            signal = %outcome.signal,
            cycles = outcome.cycles,
            targets_removed = report.targets_removed,
            pidfile_removed = report.pidfile_removed,
            "cleanup complete"
        );
    }
    Ok(outcome.signal)
}
