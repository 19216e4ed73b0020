//! Test support utilities.

pub mod env_guard;
pub mod paths;
pub mod util;

pub use paths::TestPaths;
pub use util::{POLL_DELAY, POLL_TRIES};

/// Wait for a file to appear, retrying with a fixed delay.
///
/// This is re-exported from [`util`] for convenience in tests.
///
/// # Arguments
/// * `path` – Path to the file that is expected to be created.
/// * `tries` – Maximum number of polling attempts.
/// * `delay` – Pause between attempts as a [`std::time::Duration`].
///
/// # Returns
/// `true` if the file appears within `tries` attempts, otherwise `false`.
///
/// # Examples
/// ```rust,ignore
/// use std::path::Path;
/// use test_support::{wait_for_file, POLL_DELAY, POLL_TRIES};
///
/// let path = Path::new("/tmp/example.pid");
/// let found = wait_for_file(path, POLL_TRIES, POLL_DELAY).await;
/// assert!(found);
/// ```
pub use util::wait_for_file;
pub use util::{read_pid, wait_for_absent, wait_for_marker};
