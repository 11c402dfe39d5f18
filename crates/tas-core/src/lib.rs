//! Test identity, selection and impact analysis for tas.
//!
//! This crate is framework-agnostic: it knows nothing about how tests are
//! discovered or run, only how to name them, decide which of them to run, and
//! fold their outcomes back into a report.
//!
//! # Crate layout
//!
//! - [`locator`]: hierarchical `file##suite##test##` paths.
//! - [`identity`]: stable MD5-based test and suite IDs.
//! - [`dedupe`]: disambiguation of colliding test IDs.
//! - [`policy`]: blocklist and quarantine matching.
//! - [`impact`]: change-impact selection over a dependency map.
//! - [`aggregate`]: suite totals and status rollup.
//! - [`selection`]: execution plans and result filtering.
//! - [`name_filter`]: full-name regex filters for regex-driven hosts.
//! - [`model`]: the wire data model.

pub mod aggregate;
pub mod dedupe;
pub mod error;
pub mod identity;
pub mod impact;
pub mod locator;
pub mod model;
pub mod name_filter;
pub mod policy;
pub mod selection;

pub use error::{PolicyError, ValidationError};
pub use identity::IdentityHasher;
pub use impact::{DependencyMap, ImpactAnalysis};
pub use locator::Locator;
pub use model::{
    BuildInfo, DiscoveryResult, ExecutionResult, ExecutionResults, Id, Test, TestDependencies,
    TestResult, TestStatus, TestSuite, TestSuiteResult,
};
pub use policy::{PolicyEntry, PolicyIndex, PolicyStore};
pub use selection::{ExecutionMode, ExecutionPlan, LocatorSet};
