//! Logging utilities for the daemon.
//!
//! Foreground runs log to the console through `tracing-subscriber`. Detached
//! and supervised runs log to the system journal without console echo. The
//! filter is read from `RUST_LOG` and defaults to [`DEFAULT_FILTER`].

use crate::config::DaemonMode;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter applied when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the global tracing subscriber for `mode`.
///
/// Call `init` once, after the process has detached, and before any logging
/// statements to avoid missing logs. When the system journal cannot be
/// reached, logs fall back to stderr.
///
/// # Examples
///
/// ```rust,no_run
/// use idleguard::config::DaemonMode;
/// use idleguard::logging::init;
///
/// init(DaemonMode::Foreground);
/// tracing::info!("Logging is initialized!");
/// ```
pub fn init(mode: DaemonMode) {
    if !mode.logs_to_system() {
        init_with_writer(fmt::writer::BoxMakeWriter::new(std::io::stdout));
        return;
    }
    match tracing_journald::layer() {
        Ok(journald) => {
            let installed = tracing_subscriber::registry()
                .with(env_filter())
                .with(journald.with_syslog_identifier(String::from("idleguard")))
                .try_init();
            if installed.is_err() {
                tracing::debug!("tracing subscriber already installed");
            }
        }
        Err(e) => {
            init_with_writer(fmt::writer::BoxMakeWriter::new(std::io::stderr));
            tracing::warn!(error = %e, "system journal unavailable; logging to stderr");
        }
    }
}

/// Initialize logging with a custom writer.
///
/// # Examples
///
/// ```rust,no_run
/// use idleguard::logging::init_with_writer;
/// use tracing_subscriber::fmt;
///
/// init_with_writer(fmt::writer::BoxMakeWriter::new(std::io::stdout));
/// ```
pub fn init_with_writer<W>(writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let installed = fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
