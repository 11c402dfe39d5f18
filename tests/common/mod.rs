//! Shared helpers for tas integration tests.
//!
//! Every test builds its repository in a temp directory and drives the runner
//! through [`FakeHost`], an in-process host framework with a fixed test tree.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{TimeZone as _, Utc};
use tas::RunnerError;
use tas::config::RunContext;
use tas::host::{DiscoveredTree, HostFramework, RawOutcome, RawSuite, RawTest, RunRequest};
use tas_core::Locator;
use tempfile::TempDir;

/// A repository with the given (empty) test files.
pub fn setup_repo(files: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    for file in files {
        let path = dir.path().join(file);
        std::fs::create_dir_all(path.parent().expect("file has a parent"))
            .expect("failed to create test dir");
        std::fs::write(&path, "// test file\n").expect("failed to write test file");
    }
    dir
}

/// A context with every CI variable set and reporting disabled.
pub fn context(root: &Path) -> RunContext {
    let s = |v: &str| Some(v.to_owned());
    RunContext {
        repo_root: root.to_owned(),
        repo_id: s("repo-1"),
        org_id: s("org-1"),
        commit_id: s("c0ffee"),
        build_id: s("build-7"),
        task_id: s("task-3"),
        branch_name: s("main"),
        shuffle_test: s("false"),
        ..RunContext::default()
    }
}

/// Write a policy file into `root` and return its path.
pub fn write_policy(root: &Path, json: &str) -> PathBuf {
    let path = root.join("policy.json");
    std::fs::write(&path, json).expect("failed to write policy");
    path
}

pub fn suite(file: &str, path: &[&str]) -> RawSuite {
    RawSuite {
        file: PathBuf::from(file),
        path: path.iter().map(|s| (*s).to_owned()).collect(),
    }
}

pub fn test(file: &str, suites: &[&str], title: &str) -> RawTest {
    RawTest {
        file: PathBuf::from(file),
        suites: suites.iter().map(|s| (*s).to_owned()).collect(),
        title: title.to_owned(),
    }
}

/// The recorded arguments of one `run` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunCall {
    pub files: Vec<PathBuf>,
    pub locators: Vec<String>,
    pub excluded: Vec<String>,
    pub name_pattern: String,
    pub exclude_name_pattern: String,
}

/// In-process host with a fixed test tree.
///
/// `run` reports every test in the requested files that was asked for (or
/// all, when no locators are given) and not excluded. Statuses default to
/// `passed`; override per title with [`FakeHost::status`].
pub struct FakeHost {
    root: PathBuf,
    tree: DiscoveredTree,
    statuses: HashMap<String, String>,
    pub discover_calls: RefCell<usize>,
    pub run_calls: RefCell<Vec<RunCall>>,
}

impl FakeHost {
    pub fn new(root: &Path, suites: Vec<RawSuite>, tests: Vec<RawTest>) -> Self {
        Self {
            root: root.to_owned(),
            tree: DiscoveredTree { suites, tests },
            statuses: HashMap::new(),
            discover_calls: RefCell::new(0),
            run_calls: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn status(mut self, title: &str, status: &str) -> Self {
        self.statuses.insert(title.to_owned(), status.to_owned());
        self
    }

    fn in_files(&self, file: &Path, files: &[PathBuf]) -> bool {
        files.contains(&self.root.join(file))
    }
}

impl HostFramework for &FakeHost {
    fn discover(&self, files: &[PathBuf]) -> Result<DiscoveredTree, RunnerError> {
        *self.discover_calls.borrow_mut() += 1;
        Ok(DiscoveredTree {
            suites: self
                .tree
                .suites
                .iter()
                .filter(|s| self.in_files(&s.file, files))
                .cloned()
                .collect(),
            tests: self
                .tree
                .tests
                .iter()
                .filter(|t| self.in_files(&t.file, files))
                .cloned()
                .collect(),
        })
    }

    fn run(&self, request: &RunRequest<'_>) -> Result<Vec<RawOutcome>, RunnerError> {
        self.run_calls.borrow_mut().push(RunCall {
            files: request.files.to_vec(),
            locators: request.locators.to_vec(),
            excluded: request.excluded.to_vec(),
            name_pattern: request.name_pattern.to_owned(),
            exclude_name_pattern: request.exclude_name_pattern.to_owned(),
        });
        let started = Utc
            .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
            .single()
            .expect("valid timestamp");
        let outcomes = self
            .tree
            .tests
            .iter()
            .filter(|t| self.in_files(&t.file, request.files))
            .filter(|t| {
                let printed =
                    Locator::from_parts(&t.file.to_string_lossy(), &t.suites, &t.title)
                        .to_string();
                (request.locators.is_empty() || request.locators.contains(&printed))
                    && !request.excluded.contains(&printed)
            })
            .map(|t| {
                let status = self
                    .statuses
                    .get(&t.title)
                    .cloned()
                    .unwrap_or_else(|| "passed".to_owned());
                RawOutcome {
                    file: t.file.clone(),
                    suites: t.suites.clone(),
                    title: t.title.clone(),
                    failure_message: (status == "failed").then(|| "assertion failed".to_owned()),
                    status,
                    duration: 5,
                    started_at: Some(started),
                }
            })
            .collect();
        Ok(outcomes)
    }
}

/// The tree used by most tests:
///
/// ```text
/// test/math.spec.js
///   Math
///     adds
///     div
///       by zero
///       by one
/// test/misc.spec.js
///   standalone
/// ```
pub fn math_host(root: &Path) -> FakeHost {
    FakeHost::new(
        root,
        vec![
            suite("test/math.spec.js", &["Math"]),
            suite("test/math.spec.js", &["Math", "div"]),
        ],
        vec![
            test("test/math.spec.js", &["Math"], "adds"),
            test("test/math.spec.js", &["Math", "div"], "by zero"),
            test("test/math.spec.js", &["Math", "div"], "by one"),
            test("test/misc.spec.js", &[], "standalone"),
        ],
    )
}

pub const MATH_FILES: &[&str] = &["test/math.spec.js", "test/misc.spec.js"];

pub fn patterns() -> Vec<String> {
    vec!["test/**/*.spec.js".to_owned()]
}
