//! Dependency extraction: which systems may not share a wave.
//!
//! Compares every unordered pair of descriptors. A pair conflicts when one
//! side writes a component type the other reads or writes, when either side
//! is exclusive or adds and removes entities, or when one side declared
//! `not_during` the other's sequence tag. The result is undirected; the graph builder decides
//! which side goes first.

use crate::descriptor::{EntityAccess, SystemDescriptor};

/// An unordered pair of conflicting systems, as indices into the snapshot
/// the pair was extracted from. Always `first < second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConflictPair {
    /// Index of the earlier registered system.
    pub first: usize,
    /// Index of the later registered system.
    pub second: usize,
}

/// Returns `true` if `a` and `b` must not run concurrently.
#[must_use]
pub fn conflicts(a: &SystemDescriptor, b: &SystemDescriptor) -> bool {
    a.is_exclusive()
        || b.is_exclusive()
        || a.entity_access() == EntityAccess::Write
        || b.entity_access() == EntityAccess::Write
        || a.excludes(b)
        || a.access().conflicts_with(b.access())
}

/// Computes all conflicting pairs of `systems`, in lexicographic index order.
///
/// Cost is one linear merge per pair: O(n² · k) for n systems with k
/// declared types each.
#[must_use]
pub fn extract_conflicts(systems: &[SystemDescriptor]) -> Vec<ConflictPair> {
    let mut pairs = Vec::new();
    for (first, a) in systems.iter().enumerate() {
        for (offset, b) in systems[first + 1..].iter().enumerate() {
            if conflicts(a, b) {
                pairs.push(ConflictPair {
                    first,
                    second: first + 1 + offset,
                });
            }
        }
    }
    pairs
}
