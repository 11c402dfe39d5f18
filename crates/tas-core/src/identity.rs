//! Stable identities for tests and suites.
//!
//! # Scheme
//!
//! Every suite or test has an *identifier* `title (relative/path)`. IDs are
//! the lowercase hex MD5 of newline-joined inputs:
//!
//! ```text
//! suite ID = md5(repo_id \n ancestor_1 \n ... \n self)
//! test ID  = md5(repo_id \n ancestor_1 \n ... \n ancestor_n \n self)
//! ```
//!
//! A top-level test (no enclosing suite) therefore hashes
//! `repo_id \n \n self`. The file path is part of every identifier, so
//! renaming a file changes every ID beneath it.
//!
//! The digest only needs to be stable across runs and processes. MD5 keeps
//! IDs byte-identical with the ones the reporting backend already stores.

use std::path::{Component, Path};

use md5::{Digest, Md5};

use crate::locator::Locator;
use crate::model::{Id, Test, TestSuite};

/// Lowercase hex MD5 of `input`.
#[must_use]
pub fn digest_hex(input: &str) -> String {
    let result = Md5::digest(input.as_bytes());
    let mut hex = String::with_capacity(32);
    for b in result.iter() {
        use std::fmt::Write as _;
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

/// `title (relative/path)`.
#[must_use]
pub fn identifier(title: &str, rel_path: &str) -> String {
    format!("{title} ({rel_path})")
}

/// Path of `file` relative to `repo_root`, `/`-separated.
///
/// Purely lexical: `.` components are dropped, and a file outside the root
/// gets `..` components, matching what the test frameworks print.
#[must_use]
pub fn relative_path(repo_root: &Path, file: &Path) -> String {
    let root: Vec<Component<'_>> = normalized(repo_root);
    let file: Vec<Component<'_>> = normalized(file);
    let common = root
        .iter()
        .zip(file.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<String> = Vec::new();
    for _ in common..root.len() {
        parts.push("..".to_owned());
    }
    for c in &file[common..] {
        parts.push(c.as_os_str().to_string_lossy().into_owned());
    }
    parts.join("/")
}

/// Locator `rel_path##suite_1##...##name##` for the test `name`.
#[must_use]
pub fn locator_for<S: AsRef<str>>(rel_path: &str, suites: &[S], name: &str) -> Locator {
    Locator::from_parts(rel_path, suites, name)
}

fn normalized(path: &Path) -> Vec<Component<'_>> {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

// ---------------------------------------------------------------------------
// IdentityHasher
// ---------------------------------------------------------------------------

/// Derives test and suite IDs for one repository.
#[derive(Clone, Debug)]
pub struct IdentityHasher {
    repo_id: String,
}

impl IdentityHasher {
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
        }
    }

    #[must_use]
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// ID of a suite whose identifier chain (outermost first, self last) is
    /// `chain`. Returns `None` for an empty chain, which denotes "no suite".
    #[must_use]
    pub fn suite_id<S: AsRef<str>>(&self, chain: &[S]) -> Option<Id> {
        if chain.is_empty() {
            return None;
        }
        Some(Id::new(digest_hex(&self.join(chain))))
    }

    /// ID of a test with the given ancestor suite identifiers and own
    /// identifier.
    #[must_use]
    pub fn test_id<S: AsRef<str>>(&self, ancestors: &[S], own: &str) -> Id {
        let mut input = self.join(ancestors);
        input.push('\n');
        input.push_str(own);
        Id::new(digest_hex(&input))
    }

    fn join<S: AsRef<str>>(&self, identifiers: &[S]) -> String {
        let mut input = self.repo_id.clone();
        input.push('\n');
        let joined: Vec<&str> = identifiers.iter().map(AsRef::as_ref).collect();
        input.push_str(&joined.join("\n"));
        input
    }

    /// Build the [`Test`] for a test titled `title` in `rel_path`, nested in
    /// suites titled `suites` (outermost first).
    #[must_use]
    pub fn test<S: AsRef<str>>(&self, rel_path: &str, suites: &[S], title: &str) -> Test {
        let ancestors = identifiers(rel_path, suites);
        let own = identifier(title, rel_path);
        Test {
            test_id: self.test_id(&ancestors, &own),
            detail: own,
            title: title.to_owned(),
            suite_id: self.suite_id(&ancestors),
            filepath: rel_path.to_owned(),
            locator: locator_for(rel_path, suites, title),
        }
    }

    /// Build the [`TestSuite`] for the suite at the end of `path` (suite
    /// titles, outermost first; must be non-empty) in `rel_path`.
    ///
    /// Returns `None` when `path` is empty.
    #[must_use]
    pub fn suite<S: AsRef<str>>(&self, rel_path: &str, path: &[S]) -> Option<TestSuite> {
        let chain = identifiers(rel_path, path);
        let own = chain.last()?.clone();
        let suite_id = self.suite_id(&chain)?;
        let parent = self.suite_id(&chain[..chain.len() - 1]);
        Some(TestSuite::new(suite_id, own, parent))
    }
}

fn identifiers<S: AsRef<str>>(rel_path: &str, titles: &[S]) -> Vec<String> {
    titles
        .iter()
        .map(|t| identifier(t.as_ref(), rel_path))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_ids_are_deterministic(
            repo in "[a-z0-9]{1,10}",
            suites in prop::collection::vec("[A-Za-z ]{1,8}", 0..4),
            title in "[A-Za-z ]{1,12}"
        ) {
            let a = IdentityHasher::new(repo.clone()).test("x.js", &suites, &title);
            let b = IdentityHasher::new(repo).test("x.js", &suites, &title);
            prop_assert_eq!(&a.test_id, &b.test_id);
            prop_assert_eq!(a.test_id.as_str().len(), 32);
            prop_assert_eq!(a.suite_id, b.suite_id);
        }
    }
}
