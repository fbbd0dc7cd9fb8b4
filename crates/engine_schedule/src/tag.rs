//! Explicit ordering between sequence tags.
//!
//! A [`TagOrder`] is supplied from outside the scheduler (typically by the
//! application: "input before physics before render"). Declared pairs are
//! read as a partial order, so the order is closed transitively before it
//! is turned into system edges.

use std::collections::{BTreeMap, BTreeSet};

use crate::descriptor::SequenceTag;

/// A partial order over [`SequenceTag`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagOrder {
    /// Declared `before -> {after}` pairs.
    declared: BTreeMap<SequenceTag, BTreeSet<SequenceTag>>,
}

impl TagOrder {
    /// Create an empty order (no tag precedes any other).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an order from a chain: each tag precedes the next.
    #[must_use]
    pub fn chain(tags: &[SequenceTag]) -> Self {
        let mut order = Self::new();
        for pair in tags.windows(2) {
            order.declare(pair[0], pair[1]);
        }
        order
    }

    /// Declare that systems tagged `before` run before systems tagged `after`.
    #[must_use]
    pub fn before(mut self, before: SequenceTag, after: SequenceTag) -> Self {
        self.declare(before, after);
        self
    }

    /// In-place form of [`TagOrder::before`].
    pub fn declare(&mut self, before: SequenceTag, after: SequenceTag) {
        self.declared.entry(before).or_default().insert(after);
    }

    /// Returns `true` if `a` must run before `b`, directly or transitively.
    #[must_use]
    pub fn precedes(&self, a: SequenceTag, b: SequenceTag) -> bool {
        self.reachable_from(a).contains(&b)
    }

    /// Every tag that `tag` precedes, directly or transitively.
    #[must_use]
    pub fn reachable_from(&self, tag: SequenceTag) -> BTreeSet<SequenceTag> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![tag];
        while let Some(current) = stack.pop() {
            if let Some(next) = self.declared.get(&current) {
                for &after in next {
                    if seen.insert(after) {
                        stack.push(after);
                    }
                }
            }
        }
        seen
    }

    /// Returns `true` if no pair has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}
