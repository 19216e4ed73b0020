//! Behavioural test steps for the target registry.
//!
//! Scenarios register a mix of reachable and unreachable dummy files inside a
//! scratch directory and observe what each rewrite cycle does.

use cucumber::{World, given, then, when};
use std::path::PathBuf;

use idleguard::targets::{CycleReport, RegistryError, TargetRegistry};
use idleguard_lib::MARKER_PAYLOAD;
use test_support::TestPaths;

#[derive(Debug, Default, World)]
pub struct RegistryWorld {
    paths: TestPaths,
    candidates: Vec<PathBuf>,
    registry: Option<Result<TargetRegistry, RegistryError>>,
    report: Option<CycleReport>,
}

impl RegistryWorld {
    fn registry(&mut self) -> &mut TargetRegistry {
        match self.registry.as_mut() {
            Some(Ok(registry)) => registry,
            other => panic!("expected a registry, got {other:?}"),
        }
    }
}

#[given(regex = r#"^a writable target "(.+)"$"#)]
fn a_writable_target(world: &mut RegistryWorld, name: String) {
    let path = world.paths.target(&name);
    world.candidates.push(path);
}

#[given(regex = r#"^a target "(.+)" in a missing directory$"#)]
fn a_missing_target(world: &mut RegistryWorld, name: String) {
    let path = world.paths.unreachable_target(&name);
    world.candidates.push(path);
}

#[when("the targets are registered")]
fn the_targets_are_registered(world: &mut RegistryWorld) {
    world.registry = Some(TargetRegistry::register(world.candidates.clone()));
}

#[when(regex = r#"^"(.+)" is overwritten with "(.+)"$"#)]
fn overwritten(world: &mut RegistryWorld, name: String, content: String) {
    std::fs::write(world.paths.target(&name), content).expect("overwrite target");
}

#[when("a rewrite cycle runs")]
fn a_rewrite_cycle_runs(world: &mut RegistryWorld) {
    let report = world.registry().rewrite_all();
    world.report = Some(report);
}

#[when("the registry is released")]
fn the_registry_is_released(world: &mut RegistryWorld) {
    world.registry().release();
}

#[then(regex = r"^(\d+) targets? (?:is|are) owned$")]
fn targets_owned(world: &mut RegistryWorld, count: usize) {
    assert_eq!(world.registry().owned_count(), count);
}

#[then(regex = r"^the cycle wrote (\d+) and failed (\d+)$")]
fn cycle_counts(world: &mut RegistryWorld, written: usize, failed: usize) {
    assert_eq!(world.report, Some(CycleReport { written, failed }));
}

#[then(regex = r#"^"(.+)" holds the marker$"#)]
fn holds_the_marker(world: &mut RegistryWorld, name: String) {
    let bytes = std::fs::read(world.paths.target(&name)).expect("read target");
    assert_eq!(bytes, MARKER_PAYLOAD);
}

#[then(regex = r#"^"(.+)" does not exist$"#)]
fn does_not_exist(world: &mut RegistryWorld, name: String) {
    assert!(!world.paths.target(&name).exists());
}

#[then("registration fails for lack of usable targets")]
fn registration_fails(world: &mut RegistryWorld) {
    match world.registry.take() {
        Some(Err(RegistryError::NoUsableTargets { .. })) => {}
        other => panic!("expected NoUsableTargets, got {other:?}"),
    }
}
