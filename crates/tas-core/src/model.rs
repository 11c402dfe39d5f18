//! Wire data model shared by discovery, execution, and reporting.
//!
//! Field names follow the JSON documents the reporting endpoint consumes
//! (`testID`, `suiteID`, `blockTestSource`, `start_time`, ...), so every
//! struct here carries explicit serde renames.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::locator::Locator;

// ---------------------------------------------------------------------------
// Id
// ---------------------------------------------------------------------------

/// Opaque, stable identifier of a test or suite (lowercase hex digest).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Wrap an already computed identifier.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Test / TestSuite
// ---------------------------------------------------------------------------

/// A discovered test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    #[serde(rename = "testID")]
    pub test_id: Id,
    /// `title (relative/path)`; the hash input for the test's own identity.
    #[serde(rename = "_detail")]
    pub detail: String,
    pub title: String,
    /// Owning suite; `None` for a top-level test.
    #[serde(rename = "suiteID")]
    pub suite_id: Option<Id>,
    /// Repo-relative file path.
    #[serde(default)]
    pub filepath: String,
    pub locator: Locator,
}

/// A discovered suite. Suites form a forest through `parent_suite_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    #[serde(rename = "suiteID")]
    pub suite_id: Id,
    #[serde(rename = "suiteName")]
    pub suite_name: String,
    #[serde(rename = "parentSuiteID")]
    pub parent_suite_id: Option<Id>,
    /// Tests owned by this suite and all of its descendants. Filled by
    /// [`fill_total_tests`](crate::aggregate::fill_total_tests).
    #[serde(
        rename = "totalTests",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_tests: Option<usize>,
}

impl TestSuite {
    /// A suite with no total computed yet.
    pub fn new(suite_id: Id, suite_name: impl Into<String>, parent_suite_id: Option<Id>) -> Self {
        Self {
            suite_id,
            suite_name: suite_name.into(),
            parent_suite_id,
            total_tests: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TestStatus
// ---------------------------------------------------------------------------

/// Outcome of a test or suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Blocklisted,
    Quarantined,
}

impl TestStatus {
    /// Map a free-form status label (host output, policy file) to a status.
    /// Unknown labels become [`TestStatus::Skipped`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "passed" => Self::Passed,
            "failed" => Self::Failed,
            "blocklisted" => Self::Blocklisted,
            "quarantined" => Self::Quarantined,
            _ => Self::Skipped,
        }
    }

    /// Rollup precedence: blocklisted > quarantined > failed > skipped > passed.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Passed => 0,
            Self::Skipped => 1,
            Self::Failed => 2,
            Self::Quarantined => 3,
            Self::Blocklisted => 4,
        }
    }

    /// Whether the test actually ran, so that a wall-clock window exists.
    #[must_use]
    pub const fn is_executed(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    /// Whether this status comes from a blocklist/quarantine policy.
    #[must_use]
    pub const fn is_policy(self) -> bool {
        matches!(self, Self::Blocklisted | Self::Quarantined)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Blocklisted => "blocklisted",
            Self::Quarantined => "quarantined",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

fn iso_millis(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Start/end strings for an execution window, `None` when the status says
/// nothing ran.
fn window(
    status: TestStatus,
    start: Option<DateTime<Utc>>,
    duration_ms: u64,
) -> (Option<String>, Option<String>) {
    let Some(start) = start.filter(|_| status.is_executed()) else {
        return (None, None);
    };
    let end = i64::try_from(duration_ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|d| start.checked_add_signed(d))
        .unwrap_or(start);
    (Some(iso_millis(start)), Some(iso_millis(end)))
}

/// Result of one test in one run invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(flatten)]
    pub test: Test,
    /// Milliseconds.
    pub duration: u64,
    pub status: TestStatus,
    pub blocked: bool,
    #[serde(rename = "blockTestSource")]
    pub block_test_source: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(rename = "failureMessage", default)]
    pub failure_message: Option<String>,
}

impl TestResult {
    /// A result with no timing window, policy tag, or failure message.
    #[must_use]
    pub const fn new(test: Test, status: TestStatus, duration: u64) -> Self {
        Self {
            test,
            duration,
            status,
            blocked: false,
            block_test_source: None,
            start_time: None,
            end_time: None,
            failure_message: None,
        }
    }

    /// Record when the test started. Ignored unless the test passed or failed.
    #[must_use]
    pub fn started_at(mut self, start: Option<DateTime<Utc>>) -> Self {
        (self.start_time, self.end_time) = window(self.status, start, self.duration);
        self
    }

    /// Tag the result with the policy source that blocks it.
    #[must_use]
    pub fn blocked_by(mut self, source: Option<String>) -> Self {
        self.blocked = source.is_some();
        self.block_test_source = source;
        self
    }

    #[must_use]
    pub fn with_failure(mut self, message: Option<String>) -> Self {
        self.failure_message = message;
        self
    }
}

/// Result of one suite in one run invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuiteResult {
    #[serde(flatten)]
    pub suite: TestSuite,
    /// Milliseconds.
    pub duration: u64,
    pub status: TestStatus,
    pub blocked: bool,
    #[serde(rename = "blockTestSource")]
    pub block_test_source: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl TestSuiteResult {
    #[must_use]
    pub const fn new(suite: TestSuite, status: TestStatus, duration: u64) -> Self {
        Self {
            suite,
            duration,
            status,
            blocked: false,
            block_test_source: None,
            start_time: None,
            end_time: None,
        }
    }

    /// Record when the suite started. Ignored unless it passed or failed.
    #[must_use]
    pub fn started_at(mut self, start: Option<DateTime<Utc>>) -> Self {
        (self.start_time, self.end_time) = window(self.status, start, self.duration);
        self
    }

    #[must_use]
    pub fn blocked_by(mut self, source: Option<String>) -> Self {
        self.blocked = source.is_some();
        self.block_test_source = source;
        self
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// CI coordinates identifying the build a document belongs to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    #[serde(rename = "repoID")]
    pub repo_id: String,
    #[serde(rename = "commitID")]
    pub commit_id: String,
    #[serde(rename = "buildID")]
    pub build_id: String,
    #[serde(rename = "taskID")]
    pub task_id: String,
    #[serde(rename = "orgID")]
    pub org_id: String,
    pub branch: String,
}

/// Output of the discovery phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub tests: Vec<Test>,
    #[serde(rename = "testSuites")]
    pub test_suites: Vec<TestSuite>,
    #[serde(rename = "impactedTests")]
    pub impacted_tests: Vec<Id>,
    #[serde(flatten)]
    pub build: BuildInfo,
    #[serde(rename = "executeAllTests")]
    pub execute_all_tests: bool,
}

impl DiscoveryResult {
    /// A result for a pattern that matched no test files.
    #[must_use]
    pub const fn empty(build: BuildInfo) -> Self {
        Self {
            tests: Vec::new(),
            test_suites: Vec::new(),
            impacted_tests: Vec::new(),
            build,
            execute_all_tests: false,
        }
    }
}

/// Results of a single run invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(rename = "testResults", default)]
    pub test_results: Vec<TestResult>,
    #[serde(rename = "testSuiteResults", default)]
    pub test_suite_results: Vec<TestSuiteResult>,
}

/// All run invocations of one execution phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResults {
    #[serde(rename = "taskID")]
    pub task_id: String,
    #[serde(rename = "buildID")]
    pub build_id: String,
    #[serde(rename = "repoID")]
    pub repo_id: String,
    #[serde(rename = "commitID")]
    pub commit_id: String,
    #[serde(rename = "orgID")]
    pub org_id: String,
    pub results: Vec<ExecutionResult>,
}

impl ExecutionResults {
    #[must_use]
    pub fn new(build: &BuildInfo) -> Self {
        Self {
            task_id: build.task_id.clone(),
            build_id: build.build_id.clone(),
            repo_id: build.repo_id.clone(),
            commit_id: build.commit_id.clone(),
            org_id: build.org_id.clone(),
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }
}

/// Files a single test file depends on, as reported by the dependency lister.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDependencies {
    #[serde(rename = "testFile")]
    pub test_file: String,
    #[serde(rename = "dependsOn")]
    pub depends_on: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
