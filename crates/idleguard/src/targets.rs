//! Dummy target files and the registry that owns them.
//!
//! A target is rewritten by create, lock, truncate, write, sync, close. The
//! registry is fixed once [`TargetRegistry::register`] returns: entries are
//! only iterated afterwards, never added or removed.

use idleguard_lib::MARKER_PAYLOAD;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Permission bits requested for new target files, before the umask.
pub const TARGET_MODE: u32 = 0o666;

/// Errors from a single rewrite of one target.
#[derive(Debug, Error)]
pub enum TouchError {
    /// The file could not be created or opened.
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Another process holds an exclusive lock on the file.
    #[error("{} is locked by another process", .path.display())]
    Busy { path: PathBuf },
    /// Locking, truncating, writing, or syncing failed.
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors returned by [`TargetRegistry::register`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Every candidate path failed its initial write.
    #[error("none of the {attempted} target files could be created")]
    NoUsableTargets { attempted: usize },
}

/// Rewrite `path` with the marker payload.
///
/// The file is created if absent with [`TARGET_MODE`]. An exclusive lock is
/// taken without blocking before the content is replaced, and the data is
/// flushed to storage before the descriptor is closed.
///
/// # Errors
///
/// Returns [`TouchError`] describing the step that failed.
pub fn touch(path: &Path) -> Result<(), TouchError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(TARGET_MODE)
        .open(path)
        .map_err(|source| TouchError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let write_err = |source: io::Error| TouchError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(locked) => locked,
        Err((_, Errno::EWOULDBLOCK)) => {
            return Err(TouchError::Busy {
                path: path.to_path_buf(),
            });
        }
        Err((_, errno)) => return Err(write_err(errno.into())),
    };
    locked.set_len(0).map_err(write_err)?;
    locked.write_all(MARKER_PAYLOAD).map_err(write_err)?;
    locked.sync_data().map_err(write_err)?;
    Ok(())
}

/// One registered dummy file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    path: PathBuf,
    owned: bool,
}

impl Target {
    /// Location of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the initial write succeeded and the file is still ours to
    /// rewrite and remove.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        self.owned
    }
}

/// Outcome of one rewrite cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Targets rewritten successfully.
    pub written: usize,
    /// Targets that failed this cycle and will be retried next cycle.
    pub failed: usize,
}

/// Fixed list of dummy files established at startup.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    /// Perform the initial write of every path and record which succeeded.
    ///
    /// Paths that fail are kept as unowned entries and excluded from rewrite
    /// cycles and cleanup. Repeated paths are registered once.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoUsableTargets`] when no path could be
    /// written.
    pub fn register<I, P>(paths: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut seen = HashSet::new();
        let targets: Vec<Target> = paths
            .into_iter()
            .map(Into::into)
            .filter(|p: &PathBuf| seen.insert(p.clone()))
            .map(|path| {
                let owned = match touch(&path) {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "target registered");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "target excluded");
                        false
                    }
                };
                Target { path, owned }
            })
            .collect();

        if targets.iter().any(Target::is_owned) {
            Ok(Self { targets })
        } else {
            Err(RegistryError::NoUsableTargets {
                attempted: targets.len(),
            })
        }
    }

    /// Every entry, owned or not, in registration order.
    #[must_use]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Paths of the owned entries.
    pub fn owned(&self) -> impl Iterator<Item = &Path> {
        self.targets
            .iter()
            .filter(|t| t.owned)
            .map(Target::path)
    }

    /// Number of owned entries.
    #[must_use]
    pub fn owned_count(&self) -> usize {
        self.owned().count()
    }

    /// Rewrite every owned target once.
    ///
    /// A failure is logged and does not stop the remaining targets, nor does
    /// it drop the target from later cycles.
    pub fn rewrite_all(&self) -> CycleReport {
        let mut report = CycleReport::default();
        for path in self.owned() {
            match touch(path) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "rewrite failed; retrying next cycle");
                    report.failed += 1;
                }
            }
        }
        tracing::trace!(written = report.written, failed = report.failed, "cycle complete");
        report
    }

    /// Remove every owned file and give up ownership.
    ///
    /// Returns the number of entries released. A second call releases nothing.
    /// Files already removed by someone else count as released.
    pub fn release(&mut self) -> usize {
        let mut released = 0;
        for target in self.targets.iter_mut().filter(|t| t.owned) {
            target.owned = false;
            match std::fs::remove_file(&target.path) {
                Ok(()) => released += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => released += 1,
                Err(e) => {
                    tracing::warn!(path = %target.path.display(), error = %e, "failed to remove target");
                }
            }
        }
        released
    }
}
