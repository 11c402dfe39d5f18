//! Change-impact analysis.
//!
//! Given the static dependencies of every test file and the set of files a
//! change touched, select the tests whose outcome could plausibly change.
//!
//! Two situations force a full run instead of a selection:
//! - nothing changed (no diff available, so nothing can be ruled out);
//! - no dependency map (the dependency lister was unavailable).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{Id, Test};

/// Absolute test file → absolute files it depends on.
pub type DependencyMap = BTreeMap<PathBuf, BTreeSet<PathBuf>>;

/// Outcome of [`find_impacted_tests`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    /// Impacted test IDs, each once, in discovery order.
    pub impacted_tests: Vec<Id>,
    /// Run everything; `impacted_tests` is empty in that case.
    pub execute_all_tests: bool,
}

impl ImpactAnalysis {
    /// The "run everything" answer.
    #[must_use]
    pub const fn execute_all() -> Self {
        Self {
            impacted_tests: Vec::new(),
            execute_all_tests: true,
        }
    }
}

/// Compute the tests impacted by `changed`.
///
/// A test is impacted when its own file changed (matched either as the
/// repo-relative `filepath` or its absolute form under `repo_root`), or when
/// any changed file is in the dependency set of its absolute file.
#[must_use]
pub fn find_impacted_tests(
    deps: Option<&DependencyMap>,
    tests: &[Test],
    changed: &BTreeSet<PathBuf>,
    repo_root: &Path,
) -> ImpactAnalysis {
    let Some(deps) = deps else {
        return ImpactAnalysis::execute_all();
    };
    if changed.is_empty() {
        return ImpactAnalysis::execute_all();
    }

    let mut seen: HashSet<&Id> = HashSet::new();
    let mut impacted = Vec::new();
    for test in tests {
        if seen.contains(&test.test_id) {
            continue;
        }
        let absolute = repo_root.join(&test.filepath);
        let hit = changed.contains(Path::new(&test.filepath))
            || changed.contains(&absolute)
            || deps
                .get(&absolute)
                .is_some_and(|file_deps| changed.iter().any(|c| file_deps.contains(c)));
        if hit {
            seen.insert(&test.test_id);
            impacted.push(test.test_id.clone());
        }
    }

    ImpactAnalysis {
        impacted_tests: impacted,
        execute_all_tests: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityHasher;

    fn tests() -> Vec<Test> {
        let h = IdentityHasher::new("repo");
        vec![
            h.test("test/a.spec.js", &["A"], "one"),
            h.test("test/a.spec.js", &["A"], "two"),
            h.test("test/b.spec.js", &["B"], "three"),
            h.test("test/c.spec.js", &[] as &[&str], "four"),
        ]
    }

    fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    fn deps() -> DependencyMap {
        let mut map = DependencyMap::new();
        map.insert(
            PathBuf::from("/repo/test/a.spec.js"),
            set(&["/repo/src/math.js", "/repo/src/util.js"]),
        );
        map.insert(PathBuf::from("/repo/test/b.spec.js"), set(&["/repo/src/util.js"]));
        map
    }

    #[test]
    fn missing_map_runs_everything() {
        let r = find_impacted_tests(None, &tests(), &set(&["a.js"]), Path::new("/repo"));
        assert_eq!(r, ImpactAnalysis::execute_all());
    }

    #[test]
    fn empty_change_set_runs_everything() {
        let r = find_impacted_tests(Some(&deps()), &tests(), &set(&[]), Path::new("/repo"));
        assert!(r.execute_all_tests);
        assert!(r.impacted_tests.is_empty());
    }

    #[test]
    fn dependency_change_selects_dependents() {
        let t = tests();
        let r = find_impacted_tests(
            Some(&deps()),
            &t,
            &set(&["/repo/src/math.js"]),
            Path::new("/repo"),
        );
        assert!(!r.execute_all_tests);
        assert_eq!(r.impacted_tests, [t[0].test_id.clone(), t[1].test_id.clone()]);
    }

    #[test]
    fn shared_dependency_selects_all_dependents() {
        let t = tests();
        let r = find_impacted_tests(
            Some(&deps()),
            &t,
            &set(&["/repo/src/util.js"]),
            Path::new("/repo"),
        );
        assert_eq!(r.impacted_tests.len(), 3);
    }

    #[test]
    fn own_file_change_always_impacts() {
        let t = tests();
        let empty = DependencyMap::new();
        let r = find_impacted_tests(
            Some(&empty),
            &t,
            &set(&["/repo/test/c.spec.js"]),
            Path::new("/repo"),
        );
        assert_eq!(r.impacted_tests, [t[3].test_id.clone()]);

        let r = find_impacted_tests(Some(&empty), &t, &set(&["test/c.spec.js"]), Path::new("/repo"));
        assert_eq!(r.impacted_tests, [t[3].test_id.clone()]);
    }

    #[test]
    fn unrelated_change_selects_nothing() {
        let r = find_impacted_tests(
            Some(&deps()),
            &tests(),
            &set(&["/repo/README.md"]),
            Path::new("/repo"),
        );
        assert!(!r.execute_all_tests);
        assert!(r.impacted_tests.is_empty());
    }
}
