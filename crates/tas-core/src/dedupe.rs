//! Identity collision resolution within one discovery or execution run.
//!
//! Parametrized tests with non-unique display titles hash to the same ID.
//! The first occurrence keeps its ID; the N-th repeat (1-indexed) becomes
//! `md5(original + "-" + N)`. Resolution depends on input order, so callers
//! must pass items in discovery order.

use std::collections::HashMap;

use crate::identity::digest_hex;
use crate::model::{Id, Test, TestResult};

/// Anything carrying a rewritable test ID.
pub trait HasTestId {
    fn test_id_mut(&mut self) -> &mut Id;
}

impl HasTestId for Test {
    fn test_id_mut(&mut self) -> &mut Id {
        &mut self.test_id
    }
}

impl HasTestId for TestResult {
    fn test_id_mut(&mut self) -> &mut Id {
        &mut self.test.test_id
    }
}

/// Rewrite colliding IDs in place. Returns how many IDs were rewritten.
pub fn resolve_duplicates<T: HasTestId>(items: &mut [T]) -> usize {
    let mut seen: HashMap<Id, usize> = HashMap::new();
    let mut rewritten = 0;
    for item in items.iter_mut() {
        let id = item.test_id_mut();
        let count = seen.entry(id.clone()).or_insert(0);
        if *count > 0 {
            *id = Id::new(digest_hex(&format!("{id}-{count}")));
            rewritten += 1;
        }
        *count += 1;
    }
    if rewritten > 0 {
        tracing::debug!(rewritten, "resolved duplicate test IDs");
    }
    rewritten
}
