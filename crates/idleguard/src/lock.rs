//! Single-instance enforcement through an exclusively locked pidfile.
//!
//! The lock is advisory and tied to the open descriptor, so the kernel drops
//! it when the holder exits for any reason. A clean release also removes the
//! file.

use idleguard_lib::PidRecord;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Permission bits for a newly created pidfile.
pub const PIDFILE_MODE: u32 = 0o640;

/// Times to reopen the pidfile when a lock lands on a file that was unlinked
/// by its previous holder in the meantime.
const MAX_ACQUIRE_ATTEMPTS: usize = 8;

/// Errors returned while acquiring or releasing the instance lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another live process already holds the lock.
    #[error("another instance holds {}", .path.display())]
    AlreadyRunning { path: PathBuf },
    /// The pidfile could not be opened, locked, written, or removed.
    #[error("pidfile {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    fn io(path: &Path, source: impl Into<io::Error>) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }
}

/// Exclusive hold on the pidfile for the lifetime of the process.
///
/// Dropping the handle releases it.
pub struct InstanceLock {
    path: PathBuf,
    file: Option<Flock<File>>,
}

impl std::fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLock")
            .field("path", &self.path)
            .field("held", &self.file.is_some())
            .finish()
    }
}

impl InstanceLock {
    /// Open (creating if absent) and exclusively lock `path`, then record the
    /// calling process's id in it.
    ///
    /// The attempt never blocks. The file is only truncated once the lock is
    /// held, so a losing contender leaves the holder's record intact.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::AlreadyRunning`] when another process holds the
    /// lock, or [`LockError::Io`] for any other failure.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let mut locked = lock_linked(path)?;

        locked.set_len(0).map_err(|e| LockError::io(path, e))?;
        locked
            .write_all(PidRecord::current().render().as_bytes())
            .map_err(|e| LockError::io(path, e))?;
        locked.sync_data().map_err(|e| LockError::io(path, e))?;

        tracing::debug!(path = %path.display(), "instance lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(locked),
        })
    }

    /// Path of the locked pidfile.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the lock is still held.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Remove the pidfile and drop the lock.
    ///
    /// The file is unlinked while the lock is still held. A contender that
    /// opened it earlier may then lock the orphaned inode, which
    /// [`InstanceLock::acquire`] detects and retries against the path.
    /// Calling this again, or after an operator removed the file, is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] if the file exists but cannot be removed. The
    /// lock itself is dropped regardless.
    pub fn release(&mut self) -> Result<(), LockError> {
        let Some(locked) = self.file.take() else {
            return Ok(());
        };
        let removed = match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::io(&self.path, e)),
        };
        drop(locked);
        tracing::debug!(path = %self.path.display(), "instance lock released");
        removed
    }
}

/// Lock the file currently linked at `path`, reopening when the locked inode
/// turns out to be orphaned.
fn lock_linked(path: &Path) -> Result<Flock<File>, LockError> {
    for _ in 0..MAX_ACQUIRE_ATTEMPTS {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(PIDFILE_MODE)
            .open(path)
            .map_err(|e| LockError::io(path, e))?;
        if let Some(locked) = lock_opened(path, file)? {
            return Ok(locked);
        }
        tracing::debug!(path = %path.display(), "pidfile replaced while locking; retrying");
    }
    // Only a live instance cycling the pidfile keeps replacing it.
    Err(LockError::AlreadyRunning {
        path: path.to_path_buf(),
    })
}

/// Exclusively lock an already opened `file`.
///
/// Returns `None` when the lock was taken but `file` is no longer the one
/// linked at `path`; the lock is dropped before returning.
fn lock_opened(path: &Path, file: File) -> Result<Option<Flock<File>>, LockError> {
    let locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(locked) => locked,
        Err((_, Errno::EWOULDBLOCK)) => {
            return Err(LockError::AlreadyRunning {
                path: path.to_path_buf(),
            });
        }
        Err((_, errno)) => return Err(LockError::io(path, errno)),
    };
    let held = locked.metadata().map_err(|e| LockError::io(path, e))?;
    match std::fs::metadata(path) {
        Ok(linked) if linked.dev() == held.dev() && linked.ino() == held.ino() => {
            Ok(Some(locked))
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LockError::io(path, e)),
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release instance lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{TempDir, tempdir};

    #[fixture]
    fn dir() -> TempDir {
        tempdir().expect("create tempdir")
    }

    #[rstest]
    fn acquire_records_pid(dir: TempDir) {
        let path = dir.path().join("d.pid");
        let lock = InstanceLock::acquire(&path).expect("acquire");
        let text = fs::read_to_string(&path).expect("read pidfile");
        let record: PidRecord = text.parse().expect("parse pid");
        assert_eq!(record, PidRecord::current());
        assert!(lock.is_held());
        assert_eq!(lock.path(), path);
    }

    #[rstest]
    fn second_acquire_reports_already_running(dir: TempDir) {
        let path = dir.path().join("d.pid");
        let _first = InstanceLock::acquire(&path).expect("acquire");
        let err = InstanceLock::acquire(&path).expect_err("second acquire");
        assert!(matches!(err, LockError::AlreadyRunning { .. }));
        // The loser must not clobber the holder's record.
        let text = fs::read_to_string(&path).expect("read pidfile");
        assert_eq!(text, PidRecord::current().render());
    }

    #[rstest]
    fn stale_content_is_replaced(dir: TempDir) {
        let path = dir.path().join("d.pid");
        fs::write(&path, "999999999999\nleftover\n").expect("seed");
        let _lock = InstanceLock::acquire(&path).expect("acquire");
        let text = fs::read_to_string(&path).expect("read pidfile");
        assert_eq!(text, PidRecord::current().render());
    }

    #[rstest]
    fn release_removes_file_and_allows_reacquire(dir: TempDir) {
        let path = dir.path().join("d.pid");
        let mut lock = InstanceLock::acquire(&path).expect("acquire");
        lock.release().expect("release");
        assert!(!path.exists());
        assert!(!lock.is_held());
        let _again = InstanceLock::acquire(&path).expect("reacquire");
    }

    #[rstest]
    fn release_is_idempotent(dir: TempDir) {
        let path = dir.path().join("d.pid");
        let mut lock = InstanceLock::acquire(&path).expect("acquire");
        lock.release().expect("first release");
        lock.release().expect("second release");
    }

    #[rstest]
    fn release_tolerates_missing_file(dir: TempDir) {
        let path = dir.path().join("d.pid");
        let mut lock = InstanceLock::acquire(&path).expect("acquire");
        fs::remove_file(&path).expect("operator removal");
        lock.release().expect("release after removal");
    }

    #[rstest]
    fn drop_releases(dir: TempDir) {
        let path = dir.path().join("d.pid");
        drop(InstanceLock::acquire(&path).expect("acquire"));
        assert!(!path.exists());
    }

    #[rstest]
    fn missing_directory_is_io_error(dir: TempDir) {
        let path = dir.path().join("absent").join("d.pid");
        let err = InstanceLock::acquire(&path).expect_err("acquire");
        assert!(matches!(err, LockError::Io { .. }));
    }

    #[rstest]
    fn new_pidfile_is_not_world_readable(dir: TempDir) {
        let path = dir.path().join("d.pid");
        let _lock = InstanceLock::acquire(&path).expect("acquire");
        let mode = fs::metadata(&path).expect("stat").permissions().mode();
        assert_eq!(mode & 0o007, 0);
    }

    #[rstest]
    fn lock_on_released_pidfile_is_rejected(dir: TempDir) {
        let path = dir.path().join("d.pid");
        let mut holder = InstanceLock::acquire(&path).expect("acquire");
        let early = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .expect("open before release");
        holder.release().expect("release");

        let outcome = lock_opened(&path, early).expect("lock orphaned inode");
        assert!(outcome.is_none(), "orphaned inode must not count as the lock");
    }

    #[rstest]
    fn acquire_ignores_holder_of_orphaned_pidfile(dir: TempDir) {
        let path = dir.path().join("d.pid");
        let mut holder = InstanceLock::acquire(&path).expect("acquire");
        let early = fs::File::open(&path).expect("open before release");
        holder.release().expect("release");
        let _orphan = Flock::lock(early, FlockArg::LockExclusiveNonblock)
            .map_err(|(_, e)| e)
            .expect("lock orphaned inode");

        let _current = InstanceLock::acquire(&path).expect("acquire recreated pidfile");
        let err = InstanceLock::acquire(&path).expect_err("second acquire");
        assert!(matches!(err, LockError::AlreadyRunning { .. }));
    }

    #[rstest]
    fn lock_opened_accepts_linked_file(dir: TempDir) {
        let path = dir.path().join("d.pid");
        fs::write(&path, "").expect("create");
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .expect("open");
        assert!(lock_opened(&path, file).expect("lock").is_some());
    }
}
