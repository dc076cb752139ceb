//! Canonical representative of a cycle.

use std::cmp::Ordering;

/// Shorter text first, ties broken by ordinary string order
fn shortest_then_smallest(a: &str, b: &str) -> Ordering {
    a.chars()
        .count()
        .cmp(&b.chars().count())
        .then_with(|| a.cmp(b))
}

/// The state a cycle is represented by: the shortest one, then the smallest.
///
/// The choice only depends on the set of states, so every rotation of the
/// same cycle yields the same value. Returns `None` for an empty slice.
#[must_use]
pub fn canonical(states: &[String]) -> Option<&str> {
    states
        .iter()
        .min_by(|a, b| shortest_then_smallest(a, b))
        .map(String::as_str)
}
