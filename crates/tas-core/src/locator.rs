//! Hierarchical test locators.
//!
//! A [`Locator`] addresses a test file, a suite inside it, or a single test,
//! as a chain of segments: the repo-relative file path first, then suite
//! names, then (optionally) the test name.
//!
//! # Wire format
//!
//! ```text
//! test/math.spec.js##Math##adds numbers##
//! ```
//!
//! Every segment is followed by [`SEPARATOR`], including the last one. The
//! trailing separator is what makes string-prefix containment exact:
//! `a.js##Suite##` is a prefix of `a.js##Suite##test##` but not of
//! `a.js##Suite 2##test##`.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator between locator segments.
pub const SEPARATOR: &str = "##";

/// Separator between whole locators in a locator list file.
pub const LIST_SEPARATOR: &str = "#TAS#";

// ---------------------------------------------------------------------------
// Locator
// ---------------------------------------------------------------------------

/// An ordered, non-empty chain of segments identifying a file, suite, or test.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    segments: Vec<String>,
}

impl Locator {
    /// A file-level locator with a single root segment.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            segments: vec![root.into()],
        }
    }

    /// Build a locator from a file path, its enclosing suite titles
    /// (outermost first) and a final test or suite name.
    pub fn from_parts<S: AsRef<str>>(file: &str, suites: &[S], name: &str) -> Self {
        let mut locator = Self::new(file);
        for suite in suites {
            locator.push(suite.as_ref());
        }
        locator.push(name);
        locator
    }

    /// Parse the printed form of a locator.
    ///
    /// The first token is always the root. Later tokens are appended only when
    /// non-empty, so doubled separators are tolerated. Returns `None` for the
    /// empty string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let mut parts = s.split(SEPARATOR);
        let mut locator = Self::new(parts.next()?);
        for part in parts.filter(|p| !p.is_empty()) {
            locator.push(part);
        }
        Some(locator)
    }

    /// Append a new deepest segment.
    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    /// Return a copy of this locator extended by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.push(segment);
        next
    }

    /// The enclosing scope, or `None` for a file-level locator.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The root segment: the repo-relative file path.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.segments[0]
    }

    /// All segments, root first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segments below the file: suite names followed by the leaf name.
    #[must_use]
    pub fn scope(&self) -> &[String] {
        &self.segments[1..]
    }

    /// Number of segments (1 for a file-level locator).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Replace the root file segment, keeping the rest of the chain.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.segments[0] = file.into();
        self
    }

    /// True when `other` is this locator or one of its ancestors, i.e. the
    /// printed form of `other` is a prefix of the printed form of `self`.
    #[must_use]
    pub fn lies_completely_in(&self, other: &Self) -> bool {
        self.to_string().starts_with(other.to_string().as_str())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            f.write_str(segment)?;
            f.write_str(SEPARATOR)?;
        }
        Ok(())
    }
}

/// Error returned when an empty string is parsed as a locator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("empty locator")]
pub struct EmptyLocator;

impl FromStr for Locator {
    type Err = EmptyLocator;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(EmptyLocator)
    }
}

impl TryFrom<String> for Locator {
    type Error = EmptyLocator;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or(EmptyLocator)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

// ---------------------------------------------------------------------------
// Locator lists
// ---------------------------------------------------------------------------

/// Split a `#TAS#`-separated locator list, dropping blank entries.
#[must_use]
pub fn parse_locator_list(text: &str) -> Vec<String> {
    text.split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Absolute paths of the test files named by the given locator strings.
///
/// Each distinct file appears once, in first-seen order. Empty strings are
/// ignored.
pub fn files_from_locators<'a, I>(locators: I, repo_root: &Path) -> Vec<PathBuf>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for locator in locators {
        if locator.is_empty() {
            continue;
        }
        let file = locator.split(SEPARATOR).next().unwrap_or_default();
        let path = repo_root.join(file);
        if seen.insert(path.clone()) {
            files.push(path);
        }
    }
    files
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_trailing_separator() {
        let loc = Locator::from_parts("a.js", &["Suite"], "works");
        assert_eq!(loc.to_string(), "a.js##Suite##works##");
        assert_eq!(Locator::new("a.js").to_string(), "a.js##");
    }

    #[test]
    fn parse_skips_empty_segments() {
        let loc = Locator::parse("a.js####Suite##works##").unwrap();
        assert_eq!(loc.segments(), ["a.js", "Suite", "works"]);
        assert_eq!(loc.to_string(), "a.js##Suite##works##");
    }

    #[test]
    fn parse_without_trailing_separator() {
        let loc = Locator::parse("a.js##Suite").unwrap();
        assert_eq!(loc.to_string(), "a.js##Suite##");
    }

    #[test]
    fn parse_empty_is_none() {
        assert!(Locator::parse("").is_none());
        assert!("".parse::<Locator>().is_err());
    }

    #[test]
    fn file_level_locator_contains_everything_in_file() {
        let file = Locator::new("a.js");
        let test = Locator::from_parts("a.js", &["Suite", "Inner"], "works");
        assert!(file.lies_completely_in(&file));
        assert!(test.lies_completely_in(&file));
        assert!(!file.lies_completely_in(&test));
    }

    #[test]
    fn sibling_with_common_prefix_is_not_contained() {
        let suite = Locator::from_parts("a.js", &[] as &[&str], "Suite");
        let other = Locator::from_parts("a.js", &["Suite 2"], "x");
        assert!(!other.lies_completely_in(&suite));
    }

    #[test]
    fn parent_and_scope() {
        let loc = Locator::from_parts("a.js", &["S"], "t");
        assert_eq!(loc.parent().unwrap().to_string(), "a.js##S##");
        assert_eq!(loc.scope(), ["S", "t"]);
        assert_eq!(loc.depth(), 3);
        assert!(Locator::new("a.js").parent().is_none());
    }

    #[test]
    fn serde_uses_printed_form() {
        let loc = Locator::from_parts("a.js", &["S"], "t");
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(json, "\"a.js##S##t##\"");
        let back: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, loc);
        assert!(serde_json::from_str::<Locator>("\"\"").is_err());
    }

    #[test]
    fn locator_list_splits_and_trims() {
        let list = parse_locator_list("a.js##t##\n#TAS#b.js##u###TAS#\n");
        assert_eq!(list, ["a.js##t##", "b.js##u##"]);
    }

    #[test]
    fn files_from_locators_dedupes_in_order() {
        let root = Path::new("/repo");
        let files = files_from_locators(
            ["b.js##x##", "", "a.js##y##", "b.js##z##"],
            root,
        );
        assert_eq!(
            files,
            [PathBuf::from("/repo/b.js"), PathBuf::from("/repo/a.js")]
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ._/-]{1,12}"
    }

    fn arb_locator() -> impl Strategy<Value = Locator> {
        prop::collection::vec(arb_segment(), 1..6).prop_map(|segments| {
            let mut iter = segments.into_iter();
            let mut loc = Locator::new(iter.next().unwrap_or_default());
            for s in iter {
                loc.push(s);
            }
            loc
        })
    }

    proptest! {
        #[test]
        fn prop_round_trip(loc in arb_locator()) {
            let printed = loc.to_string();
            let parsed = Locator::parse(&printed).unwrap();
            prop_assert_eq!(parsed.to_string(), printed);
        }

        #[test]
        fn prop_extension_lies_in_parent(
            parent in arb_locator(),
            extra in prop::collection::vec(arb_segment(), 1..4)
        ) {
            let mut child = parent.clone();
            for s in extra {
                child.push(s);
            }
            prop_assert!(child.lies_completely_in(&parent));
            prop_assert!(!parent.lies_completely_in(&child));
        }

        #[test]
        fn prop_lies_in_self(loc in arb_locator()) {
            prop_assert!(loc.lies_completely_in(&loc));
        }
    }
}
