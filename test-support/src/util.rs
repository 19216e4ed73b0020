//! Polling helpers for tests that observe a running daemon.
//!
//! The daemon only communicates through the files it creates and removes,
//! so tests synchronise by polling the filesystem.

use idleguard_lib::{MARKER_PAYLOAD, PidRecord};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

/// Default number of polling attempts.
pub const POLL_TRIES: u32 = 200;

/// Default pause between polling attempts.
pub const POLL_DELAY: Duration = Duration::from_millis(25);

async fn poll(tries: u32, delay: Duration, mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..tries {
        if done() {
            return true;
        }
        sleep(delay).await;
    }
    done()
}

/// Wait for a file to appear within the given number of tries.
///
/// # Examples
///
/// ```rust,ignore
/// use std::path::Path;
/// use std::time::Duration;
/// use test_support::wait_for_file;
///
/// let path = Path::new("/tmp/example.pid");
/// let found = wait_for_file(path, 5, Duration::from_millis(10)).await;
/// assert!(found);
/// ```
pub async fn wait_for_file(path: &Path, tries: u32, delay: Duration) -> bool {
    poll(tries, delay, || path.exists()).await
}

/// Wait for a file to disappear within the given number of tries.
pub async fn wait_for_absent(path: &Path, tries: u32, delay: Duration) -> bool {
    poll(tries, delay, || !path.exists()).await
}

/// Wait until `path` holds exactly the marker payload.
pub async fn wait_for_marker(path: &Path, tries: u32, delay: Duration) -> bool {
    poll(tries, delay, || {
        std::fs::read(path).is_ok_and(|bytes| bytes == MARKER_PAYLOAD)
    })
    .await
}

/// Read and parse the record in a pidfile, if it holds a complete one.
#[must_use]
pub fn read_pid(path: &Path) -> Option<PidRecord> {
    std::fs::read_to_string(path).ok()?.parse().ok()
}
