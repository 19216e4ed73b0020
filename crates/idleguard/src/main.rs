//! Entry point for the idleguard daemon binary.
//!
//! Detaches as configured, then drives the rewrite loop on a single-threaded
//! runtime until a termination signal arrives.

use idleguard::config::{Config, ConfigError, usage};
use idleguard::daemon;
use idleguard::detach::{Detachment, detach};
use idleguard::logging;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => return report_config_error(&e),
    };

    let lock = match detach(&config) {
        Ok(Detachment::Continue(lock)) => lock,
        Ok(Detachment::Parent { .. } | Detachment::AlreadyRunning) => return ExitCode::SUCCESS,
        Err(e) => {
            logging::init(config.mode);
            error!(error = %e, "failed to detach");
            return ExitCode::FAILURE;
        }
    };

    // Built only after detaching: forking must never happen with live
    // runtime threads. Logging starts inside `daemon::run`, once the
    // termination listeners exist.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            logging::init(config.mode);
            error!(error = %e, "failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(daemon::run(&config, lock)) {
        Ok(signal) => {
            info!(signal = %signal, "idleguard stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "idleguard failed");
            ExitCode::FAILURE
        }
    }
}

fn report_config_error(err: &ConfigError) -> ExitCode {
    match err {
        ConfigError::Cli(e) => {
            let _ = e.print();
        }
        other => eprintln!("error: {other}\n\n{}", usage()),
    }
    if err.is_informational() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
