//! Client for the external dependency-lister binary.
//!
//! The lister is a separate executable that statically resolves the files a
//! test file imports. It speaks a file protocol:
//!
//! 1. the request is written as JSON to `<work_dir>/input.json`;
//! 2. the binary runs as `<binary> --inputFile=<work_dir>/input.json`;
//! 3. the response is read from `<work_dir>/out.json`.
//!
//! `<binary> --ping` must print `pong` for the lister to be considered
//! available. The probe runs once per [`DependencyLister`].
//!
//! Every failure (no binary configured, failed probe, non-zero exit,
//! unreadable response) yields `None` and a warning; callers then fall back
//! to running all tests.

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context as _, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tas_core::{DependencyMap, TestDependencies};
use tracing::{debug, instrument, warn};

/// Work directory name under the repository root.
pub const DEFAULT_WORK_DIR: &str = "__tas";

const INPUT_FILE: &str = "input.json";
const OUTPUT_FILE: &str = "out.json";

/// A request understood by the lister, tagged by its `function` field.
#[derive(Debug, Serialize)]
#[serde(tag = "function")]
pub enum DependencyRequest<'a> {
    /// Dependencies of many test files at once.
    #[serde(rename = "listDependencies")]
    ListDependencies {
        #[serde(rename = "testFiles")]
        test_files: &'a [PathBuf],
    },
    /// Dependencies of one test file, resolved against `root_dir`.
    #[serde(rename = "listDependency")]
    ListDependency {
        #[serde(rename = "testFile")]
        test_file: &'a Path,
        #[serde(rename = "rootDir")]
        root_dir: &'a Path,
        #[serde(rename = "includeSelf")]
        include_self: bool,
        config: Option<&'a Value>,
    },
}

/// Dependency-lister client.
#[derive(Debug)]
pub struct DependencyLister {
    binary: Option<String>,
    work_dir: PathBuf,
    available: OnceCell<bool>,
}

impl DependencyLister {
    /// A client for `binary` exchanging files in `work_dir`. With no binary
    /// the lister is simply unavailable.
    pub fn new(binary: Option<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.filter(|b| !b.trim().is_empty()),
            work_dir: work_dir.into(),
            available: OnceCell::new(),
        }
    }

    /// A client that never answers.
    pub fn disabled() -> Self {
        Self::new(None, DEFAULT_WORK_DIR)
    }

    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Whether the binary answered `--ping` with `pong`. Probed once.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let Some(binary) = &self.binary else {
                debug!("no dependency lister configured");
                return false;
            };
            match Command::new(binary).arg("--ping").output() {
                Ok(out) if String::from_utf8_lossy(&out.stdout).contains("pong") => true,
                Ok(out) => {
                    warn!(
                        binary = %binary,
                        status = %out.status,
                        "dependency lister did not answer ping; impact analysis disabled"
                    );
                    false
                }
                Err(e) => {
                    warn!(binary = %binary, error = %e, "could not start dependency lister");
                    false
                }
            }
        })
    }

    /// Dependencies of every file in `test_files`, keyed by test file.
    #[instrument(skip_all, fields(files = test_files.len()))]
    pub fn list_dependencies(&self, test_files: &[PathBuf]) -> Option<DependencyMap> {
        let raw: BTreeMap<PathBuf, Vec<PathBuf>> =
            self.exec(&DependencyRequest::ListDependencies { test_files })?;
        let map: DependencyMap = raw
            .into_iter()
            .map(|(file, deps)| (file, deps.into_iter().collect::<BTreeSet<_>>()))
            .collect();
        debug!(entries = map.len(), "dependency map received");
        Some(map)
    }

    /// Dependencies of a single test file.
    pub fn list_dependency(
        &self,
        test_file: &Path,
        root_dir: &Path,
        include_self: bool,
        config: Option<&Value>,
    ) -> Option<TestDependencies> {
        self.exec(&DependencyRequest::ListDependency {
            test_file,
            root_dir,
            include_self,
            config,
        })
    }

    fn exec<T: DeserializeOwned>(&self, request: &DependencyRequest<'_>) -> Option<T> {
        if !self.is_available() {
            return None;
        }
        match self.try_exec(request) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                debug!("dependency lister returned null");
                None
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "dependency lister failed; running all tests");
                None
            }
        }
    }

    fn try_exec<T: DeserializeOwned>(&self, request: &DependencyRequest<'_>) -> Result<Option<T>> {
        let Some(binary) = &self.binary else {
            return Ok(None);
        };
        let input = self.work_dir.join(INPUT_FILE);
        let output = self.work_dir.join(OUTPUT_FILE);

        std::fs::create_dir_all(&self.work_dir)
            .with_context(|| format!("creating {}", self.work_dir.display()))?;
        let body = serde_json::to_vec(request).context("encoding request")?;
        std::fs::write(&input, body).with_context(|| format!("writing {}", input.display()))?;
        if let Err(e) = std::fs::remove_file(&output)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            return Err(e).with_context(|| format!("removing stale {}", output.display()));
        }

        let status = Command::new(binary)
            .arg(format!("--inputFile={}", input.display()))
            .status()
            .with_context(|| format!("running {binary}"))?;
        if !status.success() {
            bail!("{binary} exited with {status}");
        }

        let text = std::fs::read_to_string(&output)
            .with_context(|| format!("reading {}", output.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", output.display()))
    }
}
