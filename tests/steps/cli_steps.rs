//! Behavioural test steps for the command-line surface.
//!
//! These steps drive the scenarios that verify flag parsing, mode selection,
//! interval validation, and the default target.

use cucumber::{World, given, then, when};
use std::ffi::OsString;
use std::path::PathBuf;

use idleguard::config::{Config, ConfigError, DaemonMode};

#[derive(Debug, Default, World)]
pub struct CliWorld {
    args: Vec<OsString>,
    result: Option<Result<Config, ConfigError>>,
}

#[given("no CLI arguments")]
fn no_cli_arguments(world: &mut CliWorld) {
    world.args = vec![OsString::from("idleguard")];
}

#[given(regex = r#"^CLI arguments "(.*)"$"#)]
fn cli_arguments(world: &mut CliWorld, line: String) {
    world.args = std::iter::once("idleguard")
        .chain(line.split_whitespace())
        .map(OsString::from)
        .collect();
}

#[when("they are parsed")]
fn they_are_parsed(world: &mut CliWorld) {
    let _env = test_support::env_guard::EnvVarGuard::clear_prefixed("IDLEGUARD_");
    world.result = Some(Config::load_from(world.args.clone()));
}

fn config(world: &CliWorld) -> &Config {
    match world.result.as_ref() {
        Some(Ok(cfg)) => cfg,
        other => panic!("expected success, got {other:?}"),
    }
}

#[then("parsing succeeds")]
fn parsing_succeeds(world: &mut CliWorld) {
    let _ = config(world);
}

#[then("a usage error is returned")]
fn a_usage_error_is_returned(world: &mut CliWorld) {
    match world.result.take() {
        Some(Err(e)) if !e.is_informational() => {}
        other => panic!("expected usage error, got {other:?}"),
    }
}

#[then("help is displayed")]
fn help_is_displayed(world: &mut CliWorld) {
    match world.result.take() {
        Some(Err(e)) if e.is_informational() => {}
        other => panic!("expected help, got {other:?}"),
    }
}

#[then(regex = r"^the mode is (foreground|supervised|detached)$")]
fn the_mode_is(world: &mut CliWorld, mode: String) {
    let expected = match mode.as_str() {
        "foreground" => DaemonMode::Foreground,
        "supervised" => DaemonMode::Supervised,
        _ => DaemonMode::Detached,
    };
    assert_eq!(config(world).mode, expected);
}

#[then(regex = r"^the interval is (\d+) seconds$")]
fn the_interval_is(world: &mut CliWorld, secs: u64) {
    assert_eq!(config(world).interval_secs, secs);
}

#[then(regex = r#"^the pidfile is "(.+)"$"#)]
fn the_pidfile_is(world: &mut CliWorld, path: String) {
    assert_eq!(config(world).pidfile, PathBuf::from(path));
}

#[then(regex = r#"^the targets are "(.+)"$"#)]
fn the_targets_are(world: &mut CliWorld, list: String) {
    let expected: Vec<PathBuf> = list.split(',').map(PathBuf::from).collect();
    assert_eq!(config(world).targets, expected);
}
