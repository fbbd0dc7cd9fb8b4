//! Access descriptors for system data access declarations.
//!
//! An [`AccessDescriptor`] declares which component types a system reads and
//! writes. The scheduler compares descriptors pairwise to find systems that
//! must not run in the same wave.

use serde::{Deserialize, Serialize};

use crate::component::ComponentTypeId;

/// Describes the data access requirements of a system.
///
/// Both sets are kept sorted and deduplicated, so conflict tests are a linear
/// merge over the two lists. A type that is both read and written is stored
/// only as a write. Deserialized input goes through the same normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawAccess")]
pub struct AccessDescriptor {
    /// Component types the system reads immutably.
    reads: Vec<ComponentTypeId>,
    /// Component types the system writes (mutable access).
    writes: Vec<ComponentTypeId>,
}

/// Wire form of an [`AccessDescriptor`], in any order.
#[derive(Deserialize)]
struct RawAccess {
    #[serde(default)]
    reads: Vec<ComponentTypeId>,
    #[serde(default)]
    writes: Vec<ComponentTypeId>,
}

impl From<RawAccess> for AccessDescriptor {
    fn from(raw: RawAccess) -> Self {
        let mut access = Self::new();
        for type_id in raw.writes {
            access.add_write(type_id);
        }
        for type_id in raw.reads {
            access.add_read(type_id);
        }
        access
    }
}

impl AccessDescriptor {
    /// Create a new empty access descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a read-only component requirement.
    #[must_use]
    pub fn read(mut self, type_id: ComponentTypeId) -> Self {
        self.add_read(type_id);
        self
    }

    /// Add a mutable component requirement.
    #[must_use]
    pub fn write(mut self, type_id: ComponentTypeId) -> Self {
        self.add_write(type_id);
        self
    }

    /// Add a read requirement in place. Ignored if the type is already written.
    pub fn add_read(&mut self, type_id: ComponentTypeId) {
        if self.writes.binary_search(&type_id).is_ok() {
            return;
        }
        if let Err(pos) = self.reads.binary_search(&type_id) {
            self.reads.insert(pos, type_id);
        }
    }

    /// Add a write requirement in place, upgrading an existing read.
    pub fn add_write(&mut self, type_id: ComponentTypeId) {
        if let Ok(pos) = self.reads.binary_search(&type_id) {
            self.reads.remove(pos);
        }
        if let Err(pos) = self.writes.binary_search(&type_id) {
            self.writes.insert(pos, type_id);
        }
    }

    /// Sorted component types read but not written.
    #[must_use]
    pub fn reads(&self) -> &[ComponentTypeId] {
        &self.reads
    }

    /// Sorted component types written.
    #[must_use]
    pub fn writes(&self) -> &[ComponentTypeId] {
        &self.writes
    }

    /// Returns `true` if the system reads or writes `type_id`.
    #[must_use]
    pub fn accesses(&self, type_id: ComponentTypeId) -> bool {
        self.reads.binary_search(&type_id).is_ok() || self.writes.binary_search(&type_id).is_ok()
    }

    /// Returns `true` if the descriptor declares no access at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// Checks whether this descriptor conflicts with another.
    ///
    /// Two descriptors conflict when one writes a component type that the
    /// other reads or writes:
    ///
    /// ```text
    /// A.writes ∩ B.writes ≠ ∅  OR
    /// A.writes ∩ B.reads  ≠ ∅  OR
    /// A.reads  ∩ B.writes ≠ ∅
    /// ```
    ///
    /// Read-read overlap never conflicts.
    #[must_use]
    pub fn conflicts_with(&self, other: &AccessDescriptor) -> bool {
        intersects(&self.writes, &other.writes)
            || intersects(&self.writes, &other.reads)
            || intersects(&self.reads, &other.writes)
    }
}

/// Linear-time intersection test over two sorted slices.
fn intersects(a: &[ComponentTypeId], b: &[ComponentTypeId]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFORM: ComponentTypeId = ComponentTypeId(1);
    const VELOCITY: ComponentTypeId = ComponentTypeId(2);
    const AI_STATE: ComponentTypeId = ComponentTypeId(3);

    #[test]
    fn test_no_conflict_both_read() {
        let a = AccessDescriptor::new().read(TRANSFORM);
        let b = AccessDescriptor::new().read(TRANSFORM);
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn test_conflict_read_vs_write() {
        let a = AccessDescriptor::new().read(TRANSFORM);
        let b = AccessDescriptor::new().write(TRANSFORM);
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
    }

    #[test]
    fn test_conflict_write_vs_write() {
        let a = AccessDescriptor::new().write(VELOCITY);
        let b = AccessDescriptor::new().write(VELOCITY);
        assert!(a.conflicts_with(&b));
    }

    #[test]
    fn test_no_conflict_different_types() {
        // Physics: reads Transform, writes Velocity
        let physics = AccessDescriptor::new().read(TRANSFORM).write(VELOCITY);
        // AI: reads Transform, writes AiState
        let ai = AccessDescriptor::new().read(TRANSFORM).write(AI_STATE);
        assert!(!physics.conflicts_with(&ai));
    }

    #[test]
    fn test_conflict_movement_vs_physics() {
        let physics = AccessDescriptor::new().read(TRANSFORM).write(VELOCITY);
        let movement = AccessDescriptor::new().read(VELOCITY).write(TRANSFORM);
        assert!(physics.conflicts_with(&movement));
    }

    #[test]
    fn test_read_and_write_of_same_type_is_a_write() {
        let a = AccessDescriptor::new().read(TRANSFORM).write(TRANSFORM);
        assert!(a.reads().is_empty());
        assert_eq!(a.writes(), &[TRANSFORM]);

        let b = AccessDescriptor::new().write(TRANSFORM).read(TRANSFORM);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sets_are_sorted_and_deduplicated() {
        let a = AccessDescriptor::new()
            .read(AI_STATE)
            .read(TRANSFORM)
            .read(AI_STATE)
            .write(VELOCITY)
            .write(VELOCITY);
        assert_eq!(a.reads(), &[TRANSFORM, AI_STATE]);
        assert_eq!(a.writes(), &[VELOCITY]);
        assert!(a.accesses(AI_STATE));
        assert!(!AccessDescriptor::new().accesses(AI_STATE));
    }

    #[test]
    fn test_deserialize_normalizes_sets() {
        let a: AccessDescriptor =
            serde_json::from_str(r#"{"reads":[3,1,3,2],"writes":[5,1,5]}"#).unwrap();
        assert_eq!(a.reads(), &[VELOCITY, AI_STATE]);
        assert_eq!(a.writes(), &[TRANSFORM, ComponentTypeId(5)]);
        assert!(a.conflicts_with(&AccessDescriptor::new().write(TRANSFORM)));
        assert!(a.conflicts_with(&AccessDescriptor::new().read(ComponentTypeId(5))));
    }

    #[test]
    fn test_empty_descriptor_conflicts_with_nothing() {
        let empty = AccessDescriptor::new();
        assert!(empty.is_empty());
        assert!(!empty.conflicts_with(&AccessDescriptor::new().write(TRANSFORM)));
    }
}
