//! Signal-driven shutdown.
//!
//! Signal delivery never performs cleanup itself. Each handled signal is
//! turned into a one-shot request on a watch channel; the main control flow
//! wakes on that request and tears the daemon down from ordinary execution
//! context. Only the first request is recorded, so repeated or concurrent
//! signals cannot start a second cleanup.

use crate::config::DaemonMode;
use nix::sys::signal::{Signal, kill};
use nix::unistd::{Pid, getpgrp, getpid};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal::unix::{self as unix_signal, SignalKind};
use tokio::sync::watch;

/// Signals a detached daemon observes and logs without shutting down.
pub const UNHANDLED_SIGNALS: [Signal; 2] = [Signal::SIGUSR1, Signal::SIGUSR2];

/// Signals caught in `mode` only to be logged as unhandled.
///
/// Attached runs leave them at their default disposition.
#[must_use]
pub const fn unhandled_signals(mode: DaemonMode) -> &'static [Signal] {
    match mode {
        DaemonMode::Foreground | DaemonMode::Supervised => &[],
        DaemonMode::Detached => &UNHANDLED_SIGNALS,
    }
}

/// Termination signals that start a shutdown in `mode`.
#[must_use]
pub const fn handled_signals(mode: DaemonMode) -> &'static [Signal] {
    match mode {
        DaemonMode::Foreground => &[Signal::SIGINT],
        DaemonMode::Supervised => &[Signal::SIGTERM],
        DaemonMode::Detached => &[
            Signal::SIGHUP,
            Signal::SIGINT,
            Signal::SIGQUIT,
            Signal::SIGTERM,
        ],
    }
}

/// Errors raised while installing signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The runtime refused to register a listener for `signal`.
    #[error("failed to install {signal} handler: {source}")]
    Install {
        signal: Signal,
        #[source]
        source: io::Error,
    },
}

/// Sending half of the shutdown notification.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<Option<Signal>>>,
}

impl ShutdownTrigger {
    /// Record `signal` as the cause of shutdown.
    ///
    /// Returns `true` only for the request that starts the shutdown.
    pub fn request(&self, signal: Signal) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                false
            } else {
                *state = Some(signal);
                true
            }
        })
    }
}

/// Receiving half of the shutdown notification, held by the control loop.
#[derive(Debug)]
pub struct ShutdownHandle {
    rx: watch::Receiver<Option<Signal>>,
    forward: bool,
}

/// Create an unwired trigger and handle pair.
///
/// Nothing is attached to real signals and [`ShutdownHandle::propagate`] is a
/// no-op; callers drive shutdown through the trigger.
#[must_use]
pub fn channel() -> (ShutdownTrigger, ShutdownHandle) {
    let (tx, rx) = watch::channel(None);
    (
        ShutdownTrigger { tx: Arc::new(tx) },
        ShutdownHandle { rx, forward: false },
    )
}

impl ShutdownHandle {
    /// Wait until shutdown has been requested and return its cause.
    ///
    /// Cancel safe, so it can be raced against the interval sleep.
    pub async fn requested(&mut self) -> Signal {
        if let Ok(state) = self.rx.wait_for(Option::is_some).await {
            if let Some(signal) = *state {
                return signal;
            }
        }
        // Every trigger is gone, so no request can ever arrive.
        std::future::pending().await
    }

    /// The recorded cause, if shutdown has been requested.
    #[must_use]
    pub fn current(&self) -> Option<Signal> {
        *self.rx.borrow()
    }

    /// Forward `signal` to the process group when this handle is attached to
    /// real signals.
    pub fn propagate(&self, signal: Signal) {
        if self.forward {
            forward_to_process_group(signal);
        }
    }
}

/// Install listeners for the termination signals of `mode` and for its
/// [`unhandled_signals`].
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`ShutdownError::Install`] if any listener cannot be registered.
pub fn install(mode: DaemonMode) -> Result<ShutdownHandle, ShutdownError> {
    let (trigger, mut handle) = channel();
    handle.forward = true;

    for &sig in handled_signals(mode) {
        let mut stream = listen(sig)?;
        let trigger = trigger.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if trigger.request(sig) {
                    tracing::warn!(signal = %sig, "received signal; shutting down");
                } else {
                    tracing::debug!(signal = %sig, "received signal; shutdown already in progress");
                }
            }
        });
    }

    for &sig in unhandled_signals(mode) {
        let mut stream = listen(sig)?;
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                tracing::warn!(signal = %sig, "unhandled signal");
            }
        });
    }

    Ok(handle)
}

fn listen(sig: Signal) -> Result<unix_signal::Signal, ShutdownError> {
    unix_signal::signal(SignalKind::from_raw(sig as i32))
        .map_err(|source| ShutdownError::Install { signal: sig, source })
}

/// Send `signal` to every process in our process group.
///
/// Only done when this process leads its group, so a run sharing its parent's
/// group never signals the parent. Returns whether the signal was sent.
pub fn forward_to_process_group(signal: Signal) -> bool {
    if getpgrp() != getpid() {
        tracing::debug!(signal = %signal, "not a process group leader; not forwarding");
        return false;
    }
    match kill(Pid::from_raw(0), signal) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(signal = %signal, error = %e, "failed to forward signal");
            false
        }
    }
}
