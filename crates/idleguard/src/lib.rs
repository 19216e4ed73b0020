#![cfg_attr(docsrs, feature(doc_cfg))]

//! Library components for the idleguard daemon.
//!
//! # Overview
//! idleguard keeps a filesystem from going idle by rewriting one or more
//! dummy files at a fixed interval. This crate exposes:
//! - [`config::Config`]: typed, validated configuration from the command line
//!   and `IDLEGUARD_*` environment variables.
//! - [`detach`]: foreground, supervised, or fully detached operation.
//! - [`lock::InstanceLock`]: pidfile-based single-instance enforcement.
//! - [`shutdown`]: termination signals bridged into a one-shot notification.
//! - [`targets::TargetRegistry`]: the dummy files and their rewrite cycle.
//! - [`daemon::run`]: the steady-state loop and exactly-once cleanup.
//!
//! # Examples
//! ```rust,no_run
//! use idleguard::config::Config;
//!
//! let cfg = Config::load().expect("configuration must be valid");
//! println!("interval: {}s", cfg.interval_secs);
//! ```
pub mod config;
pub mod daemon;
pub mod detach;
pub mod lock;
pub mod logging;
pub mod shutdown;
pub mod targets;
