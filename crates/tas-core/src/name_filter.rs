//! Full-name filter patterns for hosts that select tests by regex.
//!
//! Some frameworks cannot be handed a list of locators; they accept a single
//! regular expression matched against a test's full name (suite titles and
//! test title joined by a space). These helpers turn locators and policy
//! scopes into such patterns.

use std::collections::HashSet;
use std::path::Path;

use crate::identity::relative_path;
use crate::locator::Locator;
use crate::policy::PolicyStore;

/// A pattern no test name can match.
pub const MATCH_NOTHING: &str = "a^";

/// Backslash-escape regex metacharacters.
#[must_use]
pub fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '-' | '/' | '\\' | '^' | '$' | '*' | '+' | '?' | '.' | '(' | ')' | '|' | '[' | ']'
                | '{' | '}'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn full_name(locator: &Locator) -> Option<String> {
    let scope = locator.scope();
    if scope.is_empty() {
        return None;
    }
    Some(scope.join(" "))
}

/// Pattern selecting exactly the requested, non-blocked tests.
///
/// Each runnable locator contributes `(^suite_1 ... name$)`. Locators that
/// the policy blocks are left out of the pattern and returned in the second
/// element (printed form). When every requested locator is blocked the
/// pattern is [`MATCH_NOTHING`].
#[must_use]
pub fn include_pattern<'a, I>(locators: I, policy: &PolicyStore) -> (String, HashSet<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut alternatives = Vec::new();
    let mut blocked = HashSet::new();
    for raw in locators {
        let Some(locator) = Locator::parse(raw) else {
            continue;
        };
        let Some(name) = full_name(&locator) else {
            continue;
        };
        if policy.is_blocked(&locator) {
            blocked.insert(locator.to_string());
        } else {
            alternatives.push(format!("(^{}$)", escape_regex(&name)));
        }
    }
    if alternatives.is_empty() {
        return (MATCH_NOTHING.to_owned(), blocked);
    }
    (alternatives.join("|"), blocked)
}

/// Pattern rejecting every test inside a policy scope of `files`.
///
/// Returns `^(?!(^scope_1)|(^scope_2)).*$`, or an empty string when none of
/// the files has a policy entry below file level.
#[must_use]
pub fn exclude_pattern<P: AsRef<Path>>(files: &[P], policy: &PolicyStore) -> String {
    let mut alternatives = Vec::new();
    for file in files {
        let rel = relative_path(policy.repo_root(), file.as_ref());
        for entry in policy.entries_for_file(&rel) {
            if let Some(name) = full_name(&entry.locator) {
                alternatives.push(format!("(^{})", escape_regex(&name)));
            }
        }
    }
    if alternatives.is_empty() {
        return String::new();
    }
    format!("^(?!{}).*$", alternatives.join("|"))
}
