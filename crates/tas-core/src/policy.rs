//! Blocklist / quarantine policy matching.
//!
//! A policy file maps test files to scopes (locators) that must not run:
//!
//! ```json
//! {
//!   "test/math.spec.js": [
//!     { "source": "api", "locator": "test/math.spec.js##Math##", "status": "quarantined" },
//!     { "source": "yml", "locator": "test/math.spec.js##Math##divides##" }
//!   ]
//! }
//! ```
//!
//! Keys may be absolute or repo-relative; they are normalized to repo-relative
//! paths, and each locator's file segment is rewritten to the normalized key.
//! `source` defaults to `yml`, `status` to `blocklisted`.
//!
//! A queried locator is blocked when some entry for its file is an
//! ancestor-or-self scope of it. The first such entry, in file order, wins.
//!
//! [`PolicyStore`] loads the file lazily on first lookup and keeps it until
//! [`PolicyStore::reset`]. A missing file means "no policy".

use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::error::PolicyError;
use crate::identity::relative_path;
use crate::locator::Locator;
use crate::model::TestStatus;

/// Default `source` for entries that do not name one.
pub const DEFAULT_SOURCE: &str = "yml";

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    locator: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// The policy document with its keys in the order they were written.
struct PolicyDocument(Vec<(String, Vec<RawEntry>)>);

impl<'de> Deserialize<'de> for PolicyDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = PolicyDocument;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping test files to policy entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut keys: Vec<(String, Vec<RawEntry>)> =
                    Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    keys.push(entry);
                }
                Ok(PolicyDocument(keys))
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// One policy scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyEntry {
    pub locator: Locator,
    pub source: String,
    /// [`TestStatus::Blocklisted`] or [`TestStatus::Quarantined`] for
    /// well-formed files; unknown labels map to [`TestStatus::Skipped`].
    pub status: TestStatus,
}

// ---------------------------------------------------------------------------
// PolicyIndex
// ---------------------------------------------------------------------------

/// Policy entries indexed by repo-relative file path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyIndex {
    by_file: HashMap<String, Vec<PolicyEntry>>,
}

impl PolicyIndex {
    /// Parse a policy document.
    ///
    /// # Errors
    /// Returns the JSON error if the document is not an object of entry lists.
    pub fn parse(json: &str, repo_root: &Path) -> Result<Self, serde_json::Error> {
        let PolicyDocument(raw) = serde_json::from_str(json)?;
        let mut index = Self::default();
        for (key, entries) in raw {
            let file = relative_path(repo_root, &repo_root.join(&key));
            let slot = index.by_file.entry(file.clone()).or_default();
            for entry in entries {
                let Some(locator) = entry.locator.as_deref().and_then(Locator::parse) else {
                    continue;
                };
                slot.push(PolicyEntry {
                    locator: locator.with_file(file.clone()),
                    source: entry.source.unwrap_or_else(|| DEFAULT_SOURCE.to_owned()),
                    status: entry
                        .status
                        .as_deref()
                        .map_or(TestStatus::Blocklisted, TestStatus::from_label),
                });
            }
        }
        Ok(index)
    }

    /// Entries for a repo-relative file, in file order.
    #[must_use]
    pub fn entries_for_file(&self, rel_path: &str) -> &[PolicyEntry] {
        self.by_file.get(rel_path).map(Vec::as_slice).unwrap_or_default()
    }

    /// The first entry whose scope contains `locator`.
    #[must_use]
    pub fn lookup(&self, locator: &Locator) -> Option<&PolicyEntry> {
        self.entries_for_file(locator.file())
            .iter()
            .find(|entry| locator.lies_completely_in(&entry.locator))
    }

    /// Total number of entries across all files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// PolicyStore
// ---------------------------------------------------------------------------

/// Lazily loaded, explicitly resettable policy.
#[derive(Debug)]
pub struct PolicyStore {
    path: Option<PathBuf>,
    repo_root: PathBuf,
    index: OnceCell<PolicyIndex>,
}

impl PolicyStore {
    /// A store backed by `path` (or no file at all). Nothing is read until
    /// the first lookup.
    pub fn new(path: Option<PathBuf>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            path,
            repo_root: repo_root.into(),
            index: OnceCell::new(),
        }
    }

    /// A store that never blocks anything.
    pub fn empty(repo_root: impl Into<PathBuf>) -> Self {
        Self::new(None, repo_root)
    }

    /// A store with an already built index.
    pub fn preloaded(index: PolicyIndex, repo_root: impl Into<PathBuf>) -> Self {
        let store = Self::empty(repo_root);
        let _ = store.index.set(index);
        store
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Root that policy keys are normalized against.
    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn read_index(&self) -> Result<PolicyIndex, PolicyError> {
        let Some(path) = &self.path else {
            return Ok(PolicyIndex::default());
        };
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "policy file not found; nothing is blocked");
                return Ok(PolicyIndex::default());
            }
            Err(source) => {
                return Err(PolicyError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };
        let index =
            PolicyIndex::parse(&contents, &self.repo_root).map_err(|source| PolicyError::Parse {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), entries = index.len(), "loaded policy");
        Ok(index)
    }

    /// Load the policy now, surfacing read and parse errors.
    ///
    /// # Errors
    /// Returns [`PolicyError`] if the file exists but cannot be read or parsed.
    pub fn try_load(&self) -> Result<&PolicyIndex, PolicyError> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let index = self.read_index()?;
        Ok(self.index.get_or_init(|| index))
    }

    /// The loaded index. Errors on this lazy path are logged and treated as
    /// an empty policy.
    pub fn index(&self) -> &PolicyIndex {
        self.index.get_or_init(|| {
            self.read_index().unwrap_or_else(|e| {
                warn!(error = %e, "ignoring unreadable policy file");
                PolicyIndex::default()
            })
        })
    }

    /// Forget the cached policy; the next lookup reads the file again.
    pub fn reset(&mut self) {
        self.index.take();
    }

    /// Re-read the policy file immediately.
    ///
    /// # Errors
    /// Returns [`PolicyError`] if the file exists but cannot be read or parsed.
    pub fn reload(&mut self) -> Result<&PolicyIndex, PolicyError> {
        self.reset();
        self.try_load()
    }

    /// The policy entry that applies to `locator`, if any.
    pub fn lookup(&self, locator: &Locator) -> Option<&PolicyEntry> {
        self.index().lookup(locator)
    }

    pub fn is_blocked(&self, locator: &Locator) -> bool {
        self.lookup(locator).is_some()
    }

    /// Source tag of the entry blocking `locator`.
    pub fn source_for(&self, locator: &Locator) -> Option<&str> {
        self.lookup(locator).map(|e| e.source.as_str())
    }

    /// Entries for a repo-relative file.
    pub fn entries_for_file(&self, rel_path: &str) -> &[PolicyEntry] {
        self.index().entries_for_file(rel_path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
