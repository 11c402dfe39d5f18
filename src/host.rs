//! The host test framework boundary.
//!
//! The runner never loads or executes test code itself. It asks a
//! [`HostFramework`] two questions: "what tests live in these files?" and
//! "run these tests and tell me what happened".
//!
//! [`CommandHost`] answers both by running a configured shell command in the
//! repository root. The command learns what to do from its environment:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `TAS_PHASE` | `discover` or `execute` |
//! | `TAS_TEST_FILES` | absolute test files, one per line |
//! | `TAS_LOCATORS` | locators to run, `#TAS#`-separated; empty = all |
//! | `TAS_EXCLUDED_LOCATORS` | locators that must not run, `#TAS#`-separated |
//! | `TAS_NAME_PATTERN` | full-name regex of the tests to run; empty = all |
//! | `TAS_EXCLUDE_NAME_PATTERN` | full-name regex rejecting blocked tests; may be empty |
//! | `TAS_OUTPUT_FILE` | where to write the JSON answer |
//!
//! A discover answer is `{"suites": [RawSuite], "tests": [RawTest]}`; an
//! execute answer is `{"tests": [RawOutcome]}`.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tas_core::locator::LIST_SEPARATOR;
use tracing::{debug, instrument};

use crate::error::RunnerError;

// ---------------------------------------------------------------------------
// Raw host documents
// ---------------------------------------------------------------------------

/// A suite as the host sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSuite {
    /// Test file, absolute or relative to the repository root.
    pub file: PathBuf,
    /// Suite titles from the outermost down to this suite.
    pub path: Vec<String>,
}

/// A test as the host sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTest {
    pub file: PathBuf,
    /// Enclosing suite titles, outermost first.
    #[serde(default)]
    pub suites: Vec<String>,
    pub title: String,
}

/// The test tree of a set of files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredTree {
    #[serde(default)]
    pub suites: Vec<RawSuite>,
    #[serde(default)]
    pub tests: Vec<RawTest>,
}

/// One executed (or skipped) test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutcome {
    pub file: PathBuf,
    #[serde(default)]
    pub suites: Vec<String>,
    pub title: String,
    /// Free-form status label; unknown labels count as skipped.
    pub status: String,
    /// Milliseconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(rename = "startedAt", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "failureMessage", default)]
    pub failure_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RunOutput {
    #[serde(default)]
    tests: Vec<RawOutcome>,
}

/// What to run in one invocation.
#[derive(Clone, Copy, Debug)]
pub struct RunRequest<'a> {
    pub files: &'a [PathBuf],
    /// Printed locators to run; empty means every test in `files`.
    pub locators: &'a [String],
    /// Printed locators that must not run.
    pub excluded: &'a [String],
    /// `locators` as a full-name regex, for hosts that filter by name.
    pub name_pattern: &'a str,
    /// `excluded` scopes as a negative full-name regex.
    pub exclude_name_pattern: &'a str,
}

// ---------------------------------------------------------------------------
// HostFramework
// ---------------------------------------------------------------------------

/// A test framework the runner can drive.
pub trait HostFramework {
    /// Enumerate suites and tests defined in `files`.
    ///
    /// # Errors
    /// Returns [`RunnerError::Host`] when the framework cannot load the files.
    fn discover(&self, files: &[PathBuf]) -> Result<DiscoveredTree, RunnerError>;

    /// Run the requested tests and report one outcome per test that ran or
    /// was skipped.
    ///
    /// # Errors
    /// Returns [`RunnerError::Host`] when the run could not be carried out.
    fn run(&self, request: &RunRequest<'_>) -> Result<Vec<RawOutcome>, RunnerError>;
}

// ---------------------------------------------------------------------------
// CommandHost
// ---------------------------------------------------------------------------

/// Drives a framework through a shell command and the JSON file protocol.
#[derive(Clone, Debug)]
pub struct CommandHost {
    command: String,
    repo_root: PathBuf,
}

impl CommandHost {
    pub fn new(command: impl Into<String>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            repo_root: repo_root.into(),
        }
    }

    fn invoke<T: DeserializeOwned>(
        &self,
        phase: &'static str,
        request: &RunRequest<'_>,
    ) -> Result<T, RunnerError> {
        let scratch = tempfile::Builder::new().prefix("tas-host-").tempdir()?;
        let output = scratch.path().join("output.json");

        let out = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.repo_root)
            .env("TAS_PHASE", phase)
            .env("TAS_TEST_FILES", join_paths(request.files))
            .env("TAS_LOCATORS", request.locators.join(LIST_SEPARATOR))
            .env("TAS_EXCLUDED_LOCATORS", request.excluded.join(LIST_SEPARATOR))
            .env("TAS_NAME_PATTERN", request.name_pattern)
            .env("TAS_EXCLUDE_NAME_PATTERN", request.exclude_name_pattern)
            .env("TAS_OUTPUT_FILE", &output)
            .output()
            .map_err(|e| RunnerError::host(phase, format!("could not start `{}`: {e}", self.command)))?;

        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.trim().is_empty() {
            debug!(phase, stderr = %stderr.trim_end(), "host stderr");
        }
        if !out.status.success() {
            return Err(RunnerError::host(
                phase,
                format!("`{}` exited with {}: {}", self.command, out.status, tail(&stderr)),
            ));
        }

        read_answer(phase, &output)
    }
}

impl HostFramework for CommandHost {
    #[instrument(skip_all, fields(files = files.len()))]
    fn discover(&self, files: &[PathBuf]) -> Result<DiscoveredTree, RunnerError> {
        self.invoke(
            "discover",
            &RunRequest {
                files,
                locators: &[],
                excluded: &[],
                name_pattern: "",
                exclude_name_pattern: "",
            },
        )
    }

    #[instrument(skip_all, fields(files = request.files.len(), locators = request.locators.len()))]
    fn run(&self, request: &RunRequest<'_>) -> Result<Vec<RawOutcome>, RunnerError> {
        let output: RunOutput = self.invoke("execute", request)?;
        Ok(output.tests)
    }
}

fn join_paths(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| f.to_string_lossy())
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_answer<T: DeserializeOwned>(phase: &'static str, path: &Path) -> Result<T, RunnerError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        RunnerError::host(phase, format!("no answer at {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text)
        .map_err(|e| RunnerError::host(phase, format!("malformed answer: {e}")))
}

/// Last few lines of a process's stderr, for error messages.
fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parses_optional_fields() {
        let o: RawOutcome = serde_json::from_str(
            r#"{"file": "a.js", "suites": ["S"], "title": "t", "status": "failed",
                "duration": 12, "startedAt": "2024-05-01T10:00:00.000Z",
                "failureMessage": "boom"}"#,
        )
        .unwrap();
        assert_eq!(o.duration, 12);
        assert_eq!(o.failure_message.as_deref(), Some("boom"));
        assert!(o.started_at.is_some());

        let o: RawOutcome =
            serde_json::from_str(r#"{"file": "a.js", "title": "t", "status": "pending"}"#).unwrap();
        assert!(o.suites.is_empty());
        assert_eq!(o.duration, 0);
        assert_eq!(o.started_at, None);
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = (1..=8).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(tail(&text), "l4\nl5\nl6\nl7\nl8");
        assert_eq!(tail(""), "");
    }

    #[cfg(unix)]
    #[test]
    fn command_host_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let host = CommandHost::new(
            r#"if [ "$TAS_PHASE" = discover ]; then
                 printf '{"suites":[{"file":"a.js","path":["S"]}],"tests":[{"file":"a.js","suites":["S"],"title":"t"}]}' > "$TAS_OUTPUT_FILE"
               else
                 printf '{"tests":[{"file":"a.js","suites":["S"],"title":"%s","status":"passed","duration":3,"failureMessage":"%s"}]}' "$TAS_LOCATORS" "$TAS_NAME_PATTERN" > "$TAS_OUTPUT_FILE"
               fi"#,
            dir.path(),
        );
        let files = vec![dir.path().join("a.js")];
        let tree = host.discover(&files).unwrap();
        assert_eq!(tree.tests.len(), 1);
        assert_eq!(tree.suites[0].path, ["S"]);

        let locators = vec!["a.js##S##t##".to_owned(), "a.js##S##u##".to_owned()];
        let outcomes = host
            .run(&RunRequest {
                files: &files,
                locators: &locators,
                excluded: &[],
                name_pattern: "(^S t$)",
                exclude_name_pattern: "",
            })
            .unwrap();
        assert_eq!(outcomes[0].title, "a.js##S##t###TAS#a.js##S##u##");
        assert_eq!(outcomes[0].failure_message.as_deref(), Some("(^S t$)"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_a_host_error() {
        let dir = tempfile::tempdir().unwrap();
        let host = CommandHost::new("echo nope >&2; exit 3", dir.path());
        let err = host.discover(&[]).unwrap_err();
        match err {
            RunnerError::Host { phase, message } => {
                assert_eq!(phase, "discover");
                assert!(message.contains("nope"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn missing_answer_is_a_host_error() {
        let dir = tempfile::tempdir().unwrap();
        let host = CommandHost::new("true", dir.path());
        assert!(matches!(host.discover(&[]), Err(RunnerError::Host { .. })));
    }
}
