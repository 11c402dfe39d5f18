//! Execution plans, selection sets, and result filtering.
//!
//! An execution plan names the locators to run and how many times:
//!
//! ```json
//! {
//!   "mode": "combined",
//!   "locators": [
//!     { "locator": "test/a.spec.js##A##one##", "n": 2 },
//!     { "locator": "test/b.spec.js##B##", "n": 2 }
//!   ]
//! }
//! ```
//!
//! In `individual` mode every locator runs in its own invocation. In
//! `combined` mode locators with the same repeat count share one invocation,
//! which is repeated `n` times.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::model::{Id, TestResult, TestSuiteResult};

// ---------------------------------------------------------------------------
// ExecutionPlan
// ---------------------------------------------------------------------------

/// How plan locators are grouped into run invocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Individual,
    Combined,
}

/// One requested locator and its repeat count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLocator {
    pub locator: String,
    pub n: u32,
}

/// A validated execution plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub mode: ExecutionMode,
    pub locators: Vec<PlanLocator>,
}

impl ExecutionPlan {
    /// Parse and validate a plan document.
    ///
    /// # Errors
    /// Returns [`ValidationError`] for malformed JSON or an invalid plan.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ValidationError::new(format!("execution plan is not valid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Validate a plan given as a JSON value.
    ///
    /// # Errors
    /// Returns [`ValidationError`] when the mode is unknown, `locators` is
    /// missing, a locator is empty, or a repeat count is missing or not a
    /// non-negative integer.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let mode = match value.get("mode").and_then(Value::as_str) {
            Some("individual") => ExecutionMode::Individual,
            Some("combined") => ExecutionMode::Combined,
            Some(other) => {
                return Err(ValidationError::new(format!(
                    "unknown execution mode '{other}'; expected 'individual' or 'combined'"
                )));
            }
            None => {
                return Err(ValidationError::new(
                    "execution plan is missing 'mode'; expected 'individual' or 'combined'",
                ));
            }
        };

        let entries = value
            .get("locators")
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError::new("execution plan is missing a 'locators' array"))?;

        let mut locators = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let locator = entry
                .get("locator")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    ValidationError::new(format!("locators[{i}]: 'locator' must be a non-empty string"))
                })?;
            let n = entry
                .get("n")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    ValidationError::new(format!(
                        "locators[{i}]: 'n' must be a non-negative integer repeat count"
                    ))
                })?;
            locators.push(PlanLocator {
                locator: locator.to_owned(),
                n,
            });
        }

        Ok(Self { mode, locators })
    }
}

// ---------------------------------------------------------------------------
// LocatorSet
// ---------------------------------------------------------------------------

/// Locators that run together in one invocation, repeated `n` times.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSet {
    pub n: u32,
    pub locators: Vec<String>,
}

/// Group a plan's locators into run invocations.
///
/// Combined-mode groups appear in the order their repeat count is first seen.
#[must_use]
pub fn create_locator_set(plan: &ExecutionPlan) -> Vec<LocatorSet> {
    match plan.mode {
        ExecutionMode::Individual => plan
            .locators
            .iter()
            .map(|l| LocatorSet {
                n: l.n,
                locators: vec![l.locator.clone()],
            })
            .collect(),
        ExecutionMode::Combined => {
            let mut sets: Vec<LocatorSet> = Vec::new();
            let mut slot_for: HashMap<u32, usize> = HashMap::new();
            for l in &plan.locators {
                let slot = *slot_for.entry(l.n).or_insert_with(|| {
                    sets.push(LocatorSet {
                        n: l.n,
                        locators: Vec::new(),
                    });
                    sets.len() - 1
                });
                sets[slot].locators.push(l.locator.clone());
            }
            sets
        }
    }
}

// ---------------------------------------------------------------------------
// Result filters
// ---------------------------------------------------------------------------

/// Keep results whose printed locator was requested or was excluded by
/// policy. Blocked tests thus still surface in the report, tagged as blocked.
#[must_use]
pub fn filter_test_results_by_locator(
    results: Vec<TestResult>,
    requested: &HashSet<String>,
    blocked: &HashSet<String>,
) -> Vec<TestResult> {
    results
        .into_iter()
        .filter(|r| {
            let printed = r.test.locator.to_string();
            requested.contains(&printed) || blocked.contains(&printed)
        })
        .collect()
}

/// Keep suites that own, directly or through descendants, at least one of
/// `test_results`.
#[must_use]
pub fn filter_suite_results(
    test_results: &[TestResult],
    suites: Vec<TestSuiteResult>,
) -> Vec<TestSuiteResult> {
    let keep: HashSet<Id> = {
        let mut parent_of: HashMap<&Id, Option<&Id>> = HashMap::new();
        for s in &suites {
            parent_of
                .entry(&s.suite.suite_id)
                .or_insert(s.suite.parent_suite_id.as_ref());
        }

        let mut keep: HashSet<&Id> = HashSet::new();
        for result in test_results {
            let mut cursor = result.test.suite_id.as_ref();
            while let Some(id) = cursor {
                let Some(parent) = parent_of.get(id) else {
                    break;
                };
                if !keep.insert(id) {
                    break;
                }
                cursor = *parent;
            }
        }
        keep.into_iter().cloned().collect()
    };

    suites
        .into_iter()
        .filter(|s| keep.contains(&s.suite.suite_id))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityHasher;
    use crate::model::{TestStatus, TestSuite};
    use serde_json::json;

    fn plan(mode: &str) -> ExecutionPlan {
        ExecutionPlan::from_value(&json!({
            "mode": mode,
            "locators": [
                { "locator": "A", "n": 2 },
                { "locator": "B", "n": 2 },
                { "locator": "C", "n": 1 },
            ]
        }))
        .unwrap()
    }

    #[test]
    fn combined_groups_by_repeat_count() {
        let sets = create_locator_set(&plan("combined"));
        assert_eq!(
            sets,
            [
                LocatorSet { n: 2, locators: vec!["A".into(), "B".into()] },
                LocatorSet { n: 1, locators: vec!["C".into()] },
            ]
        );
    }

    #[test]
    fn individual_keeps_each_locator_separate() {
        let sets = create_locator_set(&plan("individual"));
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0], LocatorSet { n: 2, locators: vec!["A".into()] });
        assert_eq!(sets[1], LocatorSet { n: 2, locators: vec!["B".into()] });
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = ExecutionPlan::from_value(&json!({"mode": "parallel", "locators": []}))
            .unwrap_err();
        assert!(err.message.contains("parallel"));
        assert!(ExecutionPlan::from_value(&json!({"locators": []})).is_err());
    }

    #[test]
    fn rejects_empty_locator() {
        let err = ExecutionPlan::from_value(&json!({
            "mode": "individual",
            "locators": [{ "locator": "", "n": 1 }]
        }))
        .unwrap_err();
        assert!(err.message.contains("locators[0]"));
    }

    #[test]
    fn rejects_missing_or_non_numeric_repeat_count() {
        for bad in [json!({"locator": "A"}), json!({"locator": "A", "n": "2"}), json!({"locator": "A", "n": 1.5})] {
            let v = json!({ "mode": "combined", "locators": [bad] });
            assert!(ExecutionPlan::from_value(&v).is_err(), "{v}");
        }
    }

    #[test]
    fn from_json_reports_syntax_errors() {
        let err = ExecutionPlan::from_json("{ nope").unwrap_err();
        assert!(err.message.contains("not valid JSON"));
    }

    fn result(h: &IdentityHasher, suites: &[&str], title: &str) -> TestResult {
        TestResult::new(h.test("a.js", suites, title), TestStatus::Passed, 1)
    }

    #[test]
    fn keeps_requested_and_blocked_results_only() {
        let h = IdentityHasher::new("r");
        let results = vec![result(&h, &["S"], "l1"), result(&h, &["S"], "l2"), result(&h, &["S"], "l3")];
        let requested: HashSet<String> =
            ["a.js##S##l1##", "a.js##S##l2##"].into_iter().map(String::from).collect();
        let blocked: HashSet<String> = ["a.js##S##l2##".to_owned()].into_iter().collect();

        let kept = filter_test_results_by_locator(results, &requested, &blocked);
        let titles: Vec<&str> = kept.iter().map(|r| r.test.title.as_str()).collect();
        assert_eq!(titles, ["l1", "l2"]);
    }

    #[test]
    fn suite_filter_keeps_ancestor_chain() {
        let h = IdentityHasher::new("r");
        let suite_result = |path: &[&str]| {
            TestSuiteResult::new(h.suite("a.js", path).unwrap(), TestStatus::Passed, 1)
        };
        let suites = vec![
            suite_result(&["Outer"]),
            suite_result(&["Outer", "Inner"]),
            suite_result(&["Other"]),
        ];
        let tests = vec![result(&h, &["Outer", "Inner"], "t")];
        let kept = filter_suite_results(&tests, suites);
        let names: Vec<&str> = kept.iter().map(|s| s.suite.suite_name.as_str()).collect();
        assert_eq!(names, ["Outer (a.js)", "Inner (a.js)"]);
    }

    #[test]
    fn suite_filter_survives_parent_cycle() {
        let a = TestSuite::new(Id::from("a"), "a", Some(Id::from("b")));
        let b = TestSuite::new(Id::from("b"), "b", Some(Id::from("a")));
        let suites = vec![
            TestSuiteResult::new(a, TestStatus::Passed, 0),
            TestSuiteResult::new(b, TestStatus::Passed, 0),
        ];
        let h = IdentityHasher::new("r");
        let mut t = result(&h, &[], "t");
        t.test.suite_id = Some(Id::from("a"));
        assert_eq!(filter_suite_results(&[t], suites).len(), 2);
    }
}
