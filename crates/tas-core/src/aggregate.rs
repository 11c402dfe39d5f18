//! Suite rollups: descendant test counts and aggregated status.
//!
//! Suites stay in the caller's slice; parent/child links are IDs resolved
//! through lookup tables, and every traversal carries a visited set, so
//! malformed parent pointers (dangling, diamond, cyclic) cannot cause
//! unbounded traversal.

use std::collections::{HashMap, HashSet};

use crate::model::{Id, Test, TestStatus, TestSuite};
use crate::policy::PolicyEntry;

/// Fill `total_tests` on every suite: tests owned directly plus the totals of
/// every descendant suite.
///
/// Descendants are found only through the adjacency list built from declared
/// parent pointers. Each suite is expanded at most once; a suite that is part
/// of a cycle contributes what was computed before the cycle closed.
pub fn fill_total_tests(tests: &[Test], suites: &mut [TestSuite]) {
    let filled: Vec<usize> = {
        let mut direct: HashMap<&Id, usize> = HashMap::new();
        for test in tests {
            if let Some(suite_id) = &test.suite_id {
                *direct.entry(suite_id).or_insert(0) += 1;
            }
        }

        let mut children: HashMap<&Id, Vec<&Id>> = HashMap::new();
        for suite in suites.iter() {
            if let Some(parent) = &suite.parent_suite_id {
                children.entry(parent).or_default().push(&suite.suite_id);
            }
        }

        let mut totals: HashMap<&Id, usize> = HashMap::new();
        let mut visited: HashSet<&Id> = HashSet::new();
        let parents: Vec<&Id> = suites
            .iter()
            .filter_map(|s| s.parent_suite_id.as_ref())
            .collect();
        for parent in parents {
            explore(parent, &direct, &children, &mut visited, &mut totals);
        }

        suites
            .iter()
            .map(|s| {
                totals
                    .get(&s.suite_id)
                    .or_else(|| direct.get(&s.suite_id))
                    .copied()
                    .unwrap_or(0)
            })
            .collect()
    };
    for (suite, total) in suites.iter_mut().zip(filled) {
        suite.total_tests = Some(total);
    }
}

fn explore<'a>(
    suite: &'a Id,
    direct: &HashMap<&'a Id, usize>,
    children: &HashMap<&'a Id, Vec<&'a Id>>,
    visited: &mut HashSet<&'a Id>,
    totals: &mut HashMap<&'a Id, usize>,
) -> usize {
    if !visited.insert(suite) {
        return totals
            .get(suite)
            .or_else(|| direct.get(suite))
            .copied()
            .unwrap_or(0);
    }
    let mut total = direct.get(suite).copied().unwrap_or(0);
    if let Some(kids) = children.get(suite) {
        for &child in kids {
            total += explore(child, direct, children, visited, totals);
        }
    }
    totals.insert(suite, total);
    total
}

/// The most severe status among `statuses`, or passed when there are none.
pub fn rollup_status<I>(statuses: I) -> TestStatus
where
    I: IntoIterator<Item = TestStatus>,
{
    statuses
        .into_iter()
        .max_by_key(|s| s.severity())
        .unwrap_or(TestStatus::Passed)
}

/// Status of a suite given the statuses of the tests beneath it and the
/// policy entry (if any) that applies to the suite itself.
///
/// A policy on the suite overrides the pass/fail rollup.
pub fn suite_status<I>(test_statuses: I, policy: Option<&PolicyEntry>) -> TestStatus
where
    I: IntoIterator<Item = TestStatus>,
{
    let rolled = rollup_status(test_statuses);
    match policy {
        Some(entry) => rollup_status([rolled, entry.status]),
        None => rolled,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
