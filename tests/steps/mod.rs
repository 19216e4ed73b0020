//! Step definitions for the behavioural test suites.

mod cli_steps;
mod registry_steps;

pub use cli_steps::CliWorld;
pub use registry_steps::RegistryWorld;
