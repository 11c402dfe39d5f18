//! tas library crate: the runner behind the `tas` binary.
//!
//! The engine (locators, identities, policy, impact analysis, rollups) lives
//! in `tas-core`. This crate wires it to the outside world: configuration,
//! the host framework, the dependency lister, and the reporting endpoint.

pub mod config;
pub mod deplister;
pub mod error;
pub mod host;
pub mod report;
pub mod runner;
pub mod telemetry;

pub use error::RunnerError;
pub use runner::{Runner, Selection};
