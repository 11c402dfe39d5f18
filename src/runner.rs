//! Discovery and execution orchestration.
//!
//! Discovery: glob → host enumerate → identity → dedupe → impact analysis
//! → suite totals → report.
//!
//! Execution: selection sets → for each set and repeat: host enumerate →
//! policy partition → host run → result reconstruction → dedupe → locator
//! filter → suite filter; then report all invocations together.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tas_core::aggregate::{fill_total_tests, suite_status};
use tas_core::dedupe::resolve_duplicates;
use tas_core::identity::{identifier, relative_path};
use tas_core::impact::find_impacted_tests;
use tas_core::locator::files_from_locators;
use tas_core::name_filter::{exclude_pattern, include_pattern};
use tas_core::selection::{
    create_locator_set, filter_suite_results, filter_test_results_by_locator,
};
use tas_core::{
    DiscoveryResult, ExecutionPlan, ExecutionResult, ExecutionResults, Id, IdentityHasher,
    Locator, PolicyStore, Test, TestResult, TestStatus, TestSuite, TestSuiteResult,
};
use tracing::{debug, info, instrument, warn};

use crate::config::RunContext;
use crate::deplister::DependencyLister;
use crate::error::RunnerError;
use crate::host::{DiscoveredTree, HostFramework, RawOutcome, RunRequest};
use crate::report::{DEFAULT_TIMEOUT, ReportClient};

/// Which tests an execution phase runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Every test matched by the file patterns, once.
    All,
    /// These printed locators, once.
    Locators(Vec<String>),
    /// An execution plan with repeat counts.
    Plan(ExecutionPlan),
}

/// Orchestrates one CI task against a host framework.
pub struct Runner<H> {
    host: H,
    ctx: RunContext,
    hasher: IdentityHasher,
    policy: PolicyStore,
    lister: DependencyLister,
    reporter: Option<ReportClient>,
}

impl<H: HostFramework> Runner<H> {
    /// A runner using the policy file named by `ctx`, no dependency lister,
    /// and a default report client created on first use.
    pub fn new(host: H, ctx: RunContext) -> Self {
        let policy = PolicyStore::new(ctx.policy_path(), ctx.repo_root.clone());
        let hasher = IdentityHasher::new(ctx.repo_id.clone().unwrap_or_default());
        Self {
            host,
            ctx,
            hasher,
            policy,
            lister: DependencyLister::disabled(),
            reporter: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PolicyStore) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_lister(mut self, lister: DependencyLister) -> Self {
        self.lister = lister;
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: ReportClient) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub const fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    /// Drop the cached policy so the next lookup re-reads the file.
    pub fn reset_policy(&mut self) {
        self.policy.reset();
    }

    pub const fn lister(&self) -> &DependencyLister {
        &self.lister
    }

    fn repo_root(&self) -> &Path {
        &self.ctx.repo_root
    }

    fn rel(&self, file: &Path) -> String {
        relative_path(self.repo_root(), &self.repo_root().join(file))
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Discover tests in the files matched by `patterns` and select those
    /// impacted by `changed`.
    ///
    /// # Errors
    /// Validation, glob, host, and report failures.
    #[instrument(skip_all, fields(patterns = patterns.len(), changed = changed.len()))]
    pub fn discover(
        &self,
        patterns: &[String],
        changed: &[PathBuf],
    ) -> Result<DiscoveryResult, RunnerError> {
        self.ctx.validate_discovery(patterns)?;
        let build = self.ctx.build_info();

        let files = self.resolve_patterns(patterns)?;
        if files.is_empty() {
            info!("no test files matched");
            return Ok(DiscoveryResult::empty(build));
        }

        let tree = self.host.discover(&files)?;
        let (mut tests, mut suites) = self.identify(&tree);
        resolve_duplicates(&mut tests);

        let changed = self.changed_set(changed);
        let deps = if changed.is_empty() {
            None
        } else {
            self.lister.list_dependencies(&files)
        };
        let impact = find_impacted_tests(deps.as_ref(), &tests, &changed, self.repo_root());
        fill_total_tests(&tests, &mut suites);

        info!(
            tests = tests.len(),
            suites = suites.len(),
            impacted = impact.impacted_tests.len(),
            execute_all = impact.execute_all_tests,
            "discovery complete"
        );
        let result = DiscoveryResult {
            tests,
            test_suites: suites,
            impacted_tests: impact.impacted_tests,
            build,
            execute_all_tests: impact.execute_all_tests,
        };

        if let Some(url) = self.ctx.test_list_endpoint() {
            self.reporter()?.post(url, &result)?;
        }
        Ok(result)
    }

    /// Tests and suites of `tree` with their identities. Every enclosing
    /// suite is present exactly once, declared by the host or not.
    fn identify(&self, tree: &DiscoveredTree) -> (Vec<Test>, Vec<TestSuite>) {
        let suites = self
            .suite_chains(tree)
            .into_iter()
            .filter_map(|(rel, path)| self.hasher.suite(&rel, path))
            .collect();
        let tests = tree
            .tests
            .iter()
            .map(|t| self.hasher.test(&self.rel(&t.file), &t.suites, &t.title))
            .collect();
        (tests, suites)
    }

    /// Every distinct suite path of `tree` with its repo-relative file, outer
    /// suites first. Prefixes of declared suite paths and of test suite
    /// chains are included.
    fn suite_chains<'t>(&self, tree: &'t DiscoveredTree) -> Vec<(String, &'t [String])> {
        let declared = tree.suites.iter().map(|s| (&s.file, s.path.as_slice()));
        let implied = tree.tests.iter().map(|t| (&t.file, t.suites.as_slice()));

        let mut seen: HashSet<(String, &[String])> = HashSet::new();
        let mut chains = Vec::new();
        for (file, path) in declared.chain(implied) {
            let rel = self.rel(file);
            for end in 1..=path.len() {
                let prefix = &path[..end];
                if seen.insert((rel.clone(), prefix)) {
                    chains.push((rel.clone(), prefix));
                }
            }
        }
        chains
    }

    /// Changed files as given plus their absolute form under the repo root.
    fn changed_set(&self, changed: &[PathBuf]) -> BTreeSet<PathBuf> {
        let mut set = BTreeSet::new();
        for path in changed {
            set.insert(path.clone());
            set.insert(self.repo_root().join(path));
        }
        set
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run the selected tests and collect one [`ExecutionResult`] per
    /// invocation.
    ///
    /// # Errors
    /// Validation, glob, host, and report failures.
    #[instrument(skip_all, fields(patterns = patterns.len()))]
    pub fn execute(
        &self,
        patterns: &[String],
        selection: &Selection,
    ) -> Result<ExecutionResults, RunnerError> {
        self.ctx.validate_execution(patterns)?;
        let mut results = ExecutionResults::new(&self.ctx.build_info());

        match selection {
            Selection::All => results.push(self.run_once(patterns, &[])?),
            Selection::Locators(locators) => results.push(self.run_once(patterns, locators)?),
            Selection::Plan(plan) => {
                for set in create_locator_set(plan) {
                    for round in 1..=set.n {
                        debug!(round, of = set.n, locators = set.locators.len(), "running set");
                        results.push(self.run_once(patterns, &set.locators)?);
                    }
                }
            }
        }

        if let Some(url) = self.ctx.test_results_endpoint() {
            self.reporter()?.post(url, &results)?;
        }
        Ok(results)
    }

    /// One host invocation. With no locators every test matched by
    /// `patterns` runs; otherwise only the named ones, in the files they name.
    fn run_once(
        &self,
        patterns: &[String],
        locators: &[String],
    ) -> Result<ExecutionResult, RunnerError> {
        let requested: HashSet<String> = locators
            .iter()
            .filter(|l| !l.is_empty())
            .cloned()
            .collect();
        let files = if requested.is_empty() {
            self.resolve_patterns(patterns)?
        } else {
            files_from_locators(locators.iter().map(String::as_str), self.repo_root())
        };
        if files.is_empty() {
            info!("nothing to run");
            return Ok(ExecutionResult::default());
        }

        let tree = self.host.discover(&files)?;
        let partition = self.partition(&tree, &requested);

        let mut test_results = Vec::new();
        let mut suite_results = Vec::new();
        if partition.runnable.is_empty() {
            if partition.blocked.is_empty() {
                warn!(
                    requested = requested.len(),
                    "no requested locator matches a discovered test"
                );
            } else {
                info!(blocked = partition.blocked.len(), "every selected test is blocked");
            }
        } else {
            let run_locators: &[String] = if requested.is_empty() {
                &[]
            } else {
                &partition.runnable
            };
            let name_pattern = if requested.is_empty() {
                String::new()
            } else {
                include_pattern(locators.iter().map(String::as_str), &self.policy).0
            };
            let exclude_name_pattern = exclude_pattern(&files, &self.policy);
            let outcomes = self.host.run(&RunRequest {
                files: &files,
                locators: run_locators,
                excluded: &partition.excluded,
                name_pattern: &name_pattern,
                exclude_name_pattern: &exclude_name_pattern,
            })?;
            test_results = outcomes.iter().map(|o| self.to_result(o)).collect();
            suite_results = self.suite_results(&tree, &outcomes);
        }
        test_results.extend(partition.blocked_tests);
        suite_results.extend(partition.blocked_suites);

        resolve_duplicates(&mut test_results);
        if !requested.is_empty() {
            test_results =
                filter_test_results_by_locator(test_results, &requested, &partition.blocked);
            suite_results = filter_suite_results(&test_results, suite_results);
        }

        info!(
            tests = test_results.len(),
            suites = suite_results.len(),
            "run complete"
        );
        Ok(ExecutionResult {
            test_results,
            test_suite_results: suite_results,
        })
    }

    /// Split the discovered tests into runnable and policy-blocked ones.
    fn partition(&self, tree: &DiscoveredTree, requested: &HashSet<String>) -> Partition {
        let mut p = Partition::default();

        for raw in &tree.tests {
            let test = self.hasher.test(&self.rel(&raw.file), &raw.suites, &raw.title);
            let printed = test.locator.to_string();
            if !requested.is_empty() && !requested.contains(&printed) {
                continue;
            }
            match self.policy.lookup(&test.locator) {
                Some(entry) => {
                    debug!(locator = %printed, status = %entry.status, "blocked by policy");
                    p.excluded.push(printed.clone());
                    p.blocked.insert(printed);
                    p.blocked_tests.push(
                        TestResult::new(test, entry.status, 0).blocked_by(Some(entry.source.clone())),
                    );
                }
                None => p.runnable.push(printed),
            }
        }

        for (rel, path) in self.suite_chains(tree) {
            let Some((name, ancestors)) = path.split_last() else {
                continue;
            };
            let locator = Locator::from_parts(&rel, ancestors, name);
            let (Some(entry), Some(suite)) =
                (self.policy.lookup(&locator), self.hasher.suite(&rel, path))
            else {
                continue;
            };
            p.blocked_suites.push(
                TestSuiteResult::new(suite, entry.status, 0).blocked_by(Some(entry.source.clone())),
            );
        }
        p
    }

    fn to_result(&self, outcome: &RawOutcome) -> TestResult {
        let test = self
            .hasher
            .test(&self.rel(&outcome.file), &outcome.suites, &outcome.title);
        let source = self.policy.source_for(&test.locator).map(str::to_owned);
        TestResult::new(test, TestStatus::from_label(&outcome.status), outcome.duration)
            .started_at(outcome.started_at)
            .blocked_by(source)
            .with_failure(outcome.failure_message.clone())
    }

    /// Suite results for every discovered suite with at least one outcome
    /// beneath it. Blocked suites are reported by [`Self::partition`].
    fn suite_results(&self, tree: &DiscoveredTree, outcomes: &[RawOutcome]) -> Vec<TestSuiteResult> {
        let mut rollups: HashMap<Id, Rollup> = HashMap::new();
        for outcome in outcomes {
            let rel = self.rel(&outcome.file);
            let mut chain: Vec<String> = Vec::with_capacity(outcome.suites.len());
            for title in &outcome.suites {
                chain.push(identifier(title, &rel));
                if let Some(id) = self.hasher.suite_id(&chain) {
                    rollups.entry(id).or_default().add(outcome);
                }
            }
        }

        let mut results = Vec::new();
        for (rel, path) in self.suite_chains(tree) {
            let Some(suite) = self.hasher.suite(&rel, path) else {
                continue;
            };
            let Some(rollup) = rollups.remove(&suite.suite_id) else {
                continue;
            };
            let locator = path
                .split_last()
                .map(|(name, ancestors)| Locator::from_parts(&rel, ancestors, name));
            if locator.as_ref().is_some_and(|l| self.policy.is_blocked(l)) {
                continue;
            }
            let status = suite_status(rollup.statuses, None);
            results.push(
                TestSuiteResult::new(suite, status, rollup.duration).started_at(rollup.start),
            );
        }
        results
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Files matched by `patterns` (relative to the repo root), each once, in
    /// pattern order.
    fn resolve_patterns(&self, patterns: &[String]) -> Result<Vec<PathBuf>, RunnerError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for pattern in patterns {
            let full = self.repo_root().join(pattern);
            let paths = glob::glob(&full.to_string_lossy()).map_err(|source| {
                RunnerError::Pattern {
                    pattern: pattern.clone(),
                    source,
                }
            })?;
            for entry in paths {
                match entry {
                    Ok(path) if path.is_file() => {
                        if seen.insert(path.clone()) {
                            files.push(path);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "skipping unreadable path"),
                }
            }
        }
        debug!(files = files.len(), "resolved test files");
        Ok(files)
    }

    fn reporter(&self) -> Result<Cow<'_, ReportClient>, RunnerError> {
        match &self.reporter {
            Some(r) => Ok(Cow::Borrowed(r)),
            None => Ok(Cow::Owned(ReportClient::new(DEFAULT_TIMEOUT)?)),
        }
    }
}

#[derive(Default)]
struct Partition {
    /// Printed locators of selected tests that may run.
    runnable: Vec<String>,
    /// Printed locators the host must skip.
    excluded: Vec<String>,
    blocked: HashSet<String>,
    blocked_tests: Vec<TestResult>,
    blocked_suites: Vec<TestSuiteResult>,
}

#[derive(Default)]
struct Rollup {
    statuses: Vec<TestStatus>,
    duration: u64,
    start: Option<DateTime<Utc>>,
}

impl Rollup {
    fn add(&mut self, outcome: &RawOutcome) {
        self.statuses.push(TestStatus::from_label(&outcome.status));
        self.duration = self.duration.saturating_add(outcome.duration);
        if let Some(at) = outcome.started_at {
            self.start = Some(self.start.map_or(at, |s| s.min(at)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(duration: u64, status: &str) -> RawOutcome {
        RawOutcome {
            file: PathBuf::from("a.js"),
            suites: vec!["S".to_owned()],
            title: "t".to_owned(),
            status: status.to_owned(),
            duration,
            started_at: None,
            failure_message: None,
        }
    }

    #[test]
    fn rollup_duration_saturates() {
        let mut rollup = Rollup::default();
        rollup.add(&outcome(u64::MAX - 1, "passed"));
        rollup.add(&outcome(10, "failed"));
        assert_eq!(rollup.duration, u64::MAX);
        assert_eq!(rollup.statuses, [TestStatus::Passed, TestStatus::Failed]);
        assert_eq!(rollup.start, None);
    }
}
