//! Configuration loading for the idleguard daemon.
//!
//! Values are layered in increasing order of precedence: built-in defaults,
//! environment variables with the `IDLEGUARD_` prefix, then command-line
//! flags. No configuration file is read.

use clap::{CommandFactory, Parser};
use figment::Figment;
use figment::providers::{Env, Serialized};
use idleguard_lib::{DEFAULT_INTERVAL_SECS, DEFAULT_PIDFILE_PATH, DEFAULT_TARGET_PATH};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "IDLEGUARD_";

/// How the process relates to its launching terminal and session.
///
/// Selected once at startup and fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonMode {
    /// Attached to the caller's terminal, logging to the console.
    Foreground,
    /// Managed by an external service supervisor; no fork and no pidfile.
    Supervised,
    /// Forked, session leader, detached from the terminal, pidfile-guarded.
    #[default]
    Detached,
}

impl DaemonMode {
    /// Whether this mode enforces a single instance through the pidfile.
    #[must_use]
    pub const fn holds_instance_lock(self) -> bool {
        matches!(self, Self::Detached)
    }

    /// Whether logs go to the system log rather than the console.
    #[must_use]
    pub const fn logs_to_system(self) -> bool {
        !matches!(self, Self::Foreground)
    }
}

/// Errors raised while assembling the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line parsing failed, or help was requested.
    #[error(transparent)]
    Cli(#[from] clap::Error),
    /// An environment override could not be interpreted.
    #[error("invalid environment configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
    /// The rewrite interval is not a positive number of seconds.
    #[error("interval must be a positive number of seconds, got {0}")]
    InvalidInterval(u64),
}

impl ConfigError {
    /// Whether the "error" is a help or version display rather than a fault.
    #[must_use]
    pub fn is_informational(&self) -> bool {
        match self {
            Self::Cli(e) => matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ),
            _ => false,
        }
    }
}

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Detachment mode.
    #[serde(default)]
    pub mode: DaemonMode,
    /// Location of the pidfile; only used in [`DaemonMode::Detached`].
    #[serde(default = "default_pidfile")]
    pub pidfile: PathBuf,
    /// Seconds between rewrite cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Dummy files rewritten every cycle.
    #[serde(default)]
    pub targets: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: DaemonMode::default(),
            pidfile: default_pidfile(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            targets: Vec::new(),
        }
    }
}

/// Command-line surface.
#[derive(Debug, Parser)]
#[command(
    name = "idleguard",
    about = "Rewrite dummy files at a fixed interval to keep a filesystem from idling"
)]
struct CliArgs {
    /// The path to the pid file [default: /var/run/idleguard.pid].
    #[arg(short = 'p', value_name = "FILE")]
    pidfile: Option<PathBuf>,
    /// Foreground mode, don't fork off as a daemon.
    #[arg(short = 'f', conflicts_with = "no_console")]
    foreground: bool,
    /// No console, don't fork off as a daemon; for use under a service supervisor.
    #[arg(short = 'n')]
    no_console: bool,
    /// Rewrite interval in seconds [default: 4].
    #[arg(
        short = 't',
        value_name = "SECONDS",
        value_parser = parse_interval,
        allow_negative_numbers = true
    )]
    interval: Option<u64>,
    /// Dummy files to rewrite [default: /tmp/idleguard.dummy].
    #[arg(value_name = "FILE")]
    targets: Vec<PathBuf>,
}

impl CliArgs {
    fn mode(&self) -> Option<DaemonMode> {
        if self.foreground {
            Some(DaemonMode::Foreground)
        } else if self.no_console {
            Some(DaemonMode::Supervised)
        } else {
            None
        }
    }
}

fn default_pidfile() -> PathBuf {
    PathBuf::from(DEFAULT_PIDFILE_PATH)
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn parse_interval(raw: &str) -> Result<u64, String> {
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a whole number of seconds"))?;
    u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| String::from("interval must be a positive number of seconds"))
}

/// Rendered usage text, as shown for `-h` and after usage errors.
#[must_use]
pub fn usage() -> String {
    CliArgs::command().render_help().to_string()
}

impl Config {
    /// Load the configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the arguments are malformed, help is
    /// requested, or an environment override is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(std::env::args_os())
    }

    /// Load the configuration from an explicit argument list.
    ///
    /// The first item is the program name, as with [`std::env::args_os`].
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = CliArgs::try_parse_from(args)?;
        Self::from_env_with_cli(cli)
    }

    fn from_env_with_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let fig = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX));
        let mut cfg: Self = fig.extract().map_err(Box::new)?;

        if let Some(mode) = cli.mode() {
            cfg.mode = mode;
        }
        if let Some(pidfile) = cli.pidfile {
            cfg.pidfile = pidfile;
        }
        if let Some(secs) = cli.interval {
            cfg.interval_secs = secs;
        }
        if !cli.targets.is_empty() {
            cfg.targets = cli.targets;
        }
        cfg.validate()
    }

    fn validate(mut self) -> Result<Self, ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval(self.interval_secs));
        }
        if self.targets.is_empty() {
            self.targets.push(PathBuf::from(DEFAULT_TARGET_PATH));
        }
        Ok(self)
    }

    /// Time between rewrite cycles.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
