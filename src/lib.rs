//! Shared types for the idleguard project.
//!
//! This library defines the on-disk artifacts the daemon produces: the
//! pidfile record and the marker payload written into every target file.
//! Both the daemon and its tests depend on these so the formats cannot drift.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default pidfile path used for single-instance enforcement.
pub const DEFAULT_PIDFILE_PATH: &str = "/var/run/idleguard.pid";

/// Target rewritten when no explicit paths are supplied.
pub const DEFAULT_TARGET_PATH: &str = "/tmp/idleguard.dummy";

/// Default rewrite interval in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 4;

/// Payload written into every target file on each rewrite.
pub const MARKER_PAYLOAD: &[u8] = b"load cycle prevention\n";

/// Errors returned when parsing pidfile contents.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PidRecordError {
    /// The record is not newline terminated.
    #[error("pid record is not newline terminated")]
    Unterminated,
    /// The record does not hold a positive decimal process id.
    #[error("invalid process id: {0:?}")]
    InvalidPid(String),
}

/// Process identifier as recorded in the pidfile.
///
/// The textual form is the decimal PID followed by a single newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidRecord(u32);

impl PidRecord {
    /// Record for the calling process.
    #[must_use]
    pub fn current() -> Self {
        Self(std::process::id())
    }

    /// Wrap a raw process id.
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self(pid)
    }

    /// The recorded process id.
    #[must_use]
    pub const fn pid(self) -> u32 {
        self.0
    }

    /// Render the record exactly as it is stored on disk.
    ///
    /// # Examples
    ///
    /// ```
    /// use idleguard_lib::PidRecord;
    ///
    /// assert_eq!(PidRecord::new(42).render(), "42\n");
    /// ```
    #[must_use]
    pub fn render(self) -> String {
        format!("{}\n", self.0)
    }
}

impl fmt::Display for PidRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PidRecord {
    type Err = PidRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_suffix('\n').ok_or(PidRecordError::Unterminated)?;
        match digits.parse::<u32>() {
            Ok(pid) if pid > 0 && !digits.starts_with('+') => Ok(Self(pid)),
            _ => Err(PidRecordError::InvalidPid(digits.to_owned())),
        }
    }
}
