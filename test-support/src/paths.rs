//! Scratch locations for daemon tests.
//!
//! Every path lives inside a private temporary directory that is removed when
//! the [`TestPaths`] value is dropped.

use std::path::PathBuf;
use tempfile::TempDir;

/// Temporary directory holding a pidfile and target files.
#[derive(Debug)]
pub struct TestPaths {
    dir: TempDir,
}

impl TestPaths {
    /// Create a fresh scratch directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    #[expect(clippy::expect_used, reason = "simplify test setup")]
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    /// Pidfile location inside the scratch directory.
    #[must_use]
    pub fn pidfile(&self) -> PathBuf {
        self.dir.path().join("idleguard.pid")
    }

    /// A target file that can be created.
    #[must_use]
    pub fn target(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// A target file whose parent directory does not exist.
    #[must_use]
    pub fn unreachable_target(&self, name: &str) -> PathBuf {
        self.dir.path().join("missing").join(name)
    }
}

impl Default for TestPaths {
    fn default() -> Self {
        Self::new()
    }
}
