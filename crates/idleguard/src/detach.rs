//! Session detachment.
//!
//! Turns the launched process into the shape its [`DaemonMode`] requires.
//! Foreground and supervised runs stay as they are. A detached run forks,
//! lets the parent go, drops every inherited descriptor, points the standard
//! streams at the null device, tightens the umask, becomes a session leader,
//! and takes the instance lock.
//!
//! Must run before any threads or the Tokio runtime exist.

use crate::config::{Config, DaemonMode};
use crate::lock::{InstanceLock, LockError};
use nix::errno::Errno;
use nix::sys::resource::{Resource, getrlimit};
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::stat::{Mode, umask};
use nix::unistd::{ForkResult, Pid, close, dup2, fork, setsid};
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::path::Path;
use thiserror::Error;

/// Device the standard streams are redirected to.
pub const NULL_DEVICE: &str = "/dev/null";

/// File-creation mask applied in detached mode (owner and group only).
pub const DETACHED_UMASK: u32 = 0o027;

/// Signals ignored once detached: child exits and terminal job control.
pub const IGNORED_SIGNALS: [Signal; 4] = [
    Signal::SIGCHLD,
    Signal::SIGTSTP,
    Signal::SIGTTOU,
    Signal::SIGTTIN,
];

/// Upper bound on descriptors scanned when `/proc/self/fd` is unavailable.
const MAX_SCANNED_DESCRIPTORS: u64 = 65_536;

/// Errors that abort detachment. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum DetachError {
    /// A process-control call failed.
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: Errno,
    },
    /// The null device could not be opened.
    #[error("cannot open /dev/null: {0}")]
    NullDevice(#[source] io::Error),
    /// The pidfile could not be opened or written.
    #[error(transparent)]
    Lock(LockError),
}

fn os(op: &'static str) -> impl FnOnce(Errno) -> DetachError {
    move |source| DetachError::Os { op, source }
}

/// Result of a successful detachment step.
#[derive(Debug)]
pub enum Detachment {
    /// This process is the daemon. In detached mode it holds the lock.
    Continue(Option<InstanceLock>),
    /// This is the launching parent; it must exit successfully at once.
    Parent { child: Pid },
    /// Another instance holds the pidfile; exit successfully doing nothing.
    AlreadyRunning,
}

/// Detach according to `config.mode`.
///
/// # Errors
///
/// Returns [`DetachError`] if forking, redirecting the standard streams,
/// creating the session, or opening the pidfile fails.
pub fn detach(config: &Config) -> Result<Detachment, DetachError> {
    match config.mode {
        DaemonMode::Foreground | DaemonMode::Supervised => Ok(Detachment::Continue(None)),
        DaemonMode::Detached => detach_fully(&config.pidfile),
    }
}

fn detach_fully(pidfile: &Path) -> Result<Detachment, DetachError> {
    // SAFETY: called from `main` before any other thread is spawned, so the
    // child inherits a consistent single-threaded address space.
    if let ForkResult::Parent { child } = unsafe { fork() }.map_err(os("fork"))? {
        return Ok(Detachment::Parent { child });
    }

    close_inherited_descriptors();
    redirect_standard_streams()?;
    umask(Mode::from_bits_truncate(DETACHED_UMASK));
    setsid().map_err(os("setsid"))?;

    let lock = match InstanceLock::acquire(pidfile) {
        Ok(lock) => lock,
        Err(LockError::AlreadyRunning { .. }) => return Ok(Detachment::AlreadyRunning),
        Err(e) => return Err(DetachError::Lock(e)),
    };
    ignore_job_control()?;
    Ok(Detachment::Continue(Some(lock)))
}

/// Descriptors currently open in this process.
fn open_descriptors() -> Vec<RawFd> {
    if let Ok(entries) = std::fs::read_dir("/proc/self/fd") {
        return entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().to_str()?.parse().ok())
            .collect();
    }
    let limit = getrlimit(Resource::RLIMIT_NOFILE)
        .map_or(MAX_SCANNED_DESCRIPTORS, |(soft, _)| {
            soft.min(MAX_SCANNED_DESCRIPTORS)
        });
    (0..RawFd::try_from(limit).unwrap_or(RawFd::MAX)).collect()
}

fn close_inherited_descriptors() {
    for fd in open_descriptors() {
        // EBADF is expected for the directory handle used by the scan.
        let _ = close(fd);
    }
}

fn redirect_standard_streams() -> Result<(), DetachError> {
    let null = OpenOptions::new()
        .read(true)
        .write(true)
        .open(NULL_DEVICE)
        .map_err(DetachError::NullDevice)?;
    let fd = null.into_raw_fd();
    for std_fd in 0..=2 {
        if fd != std_fd {
            dup2(fd, std_fd).map_err(os("dup2"))?;
        }
    }
    if fd > 2 {
        close(fd).map_err(os("close"))?;
    }
    Ok(())
}

fn ignore_job_control() -> Result<(), DetachError> {
    for sig in IGNORED_SIGNALS {
        // SAFETY: SIG_IGN installs no handler code.
        unsafe { signal(sig, SigHandler::SigIgn) }.map_err(os("signal"))?;
    }
    Ok(())
}
