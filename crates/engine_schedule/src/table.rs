//! The table of registered systems, in registration order.
//!
//! The table owns every [`SystemDescriptor`]. Registration order matters: it
//! is the tie-break that makes plan construction deterministic, so the table
//! keeps descriptors in a map keyed by a monotonically increasing sequence
//! number rather than by id.
//!
//! The table is not synchronized. All mutation must happen between ticks;
//! the [`Scheduler`](crate::Scheduler) enforces this through `&mut self`.

use std::collections::{BTreeMap, HashMap};

use crate::descriptor::{ModuleId, SystemDescriptor, SystemId};
use crate::error::RegistryError;

/// Registry of all systems known to the scheduler.
#[derive(Debug)]
pub struct DescriptorTable {
    /// Descriptors keyed by registration sequence number.
    entries: BTreeMap<u64, SystemDescriptor>,
    /// Maps each system id to its sequence number.
    index: HashMap<SystemId, u64>,
    /// Next registration sequence number.
    next_seq: u64,
    /// Next candidate for an assigned id.
    next_id: u64,
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorTable {
    /// Create a new empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
            next_id: 1,
        }
    }

    /// Register a system and return its id.
    ///
    /// If the descriptor carries an id it is used as-is; otherwise the next
    /// free id is assigned.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if the requested id is taken.
    pub fn register(&mut self, mut descriptor: SystemDescriptor) -> Result<SystemId, RegistryError> {
        let id = if descriptor.id.is_assigned() {
            if self.index.contains_key(&descriptor.id) {
                return Err(RegistryError::DuplicateId(descriptor.id));
            }
            descriptor.id
        } else {
            self.allocate_id()
        };
        descriptor.id = id;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(id, seq);
        self.entries.insert(seq, descriptor);
        Ok(id)
    }

    fn allocate_id(&mut self) -> SystemId {
        while self.index.contains_key(&SystemId(self.next_id)) {
            self.next_id += 1;
        }
        let id = SystemId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Remove a system and return its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownSystem`] if no such system exists.
    pub fn unregister(&mut self, id: SystemId) -> Result<SystemDescriptor, RegistryError> {
        let seq = self
            .index
            .remove(&id)
            .ok_or(RegistryError::UnknownSystem(id))?;
        self.entries
            .remove(&seq)
            .ok_or(RegistryError::UnknownSystem(id))
    }

    /// Remove every system owned by `module`, returning their ids in
    /// registration order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownModule`] if the module owns nothing;
    /// the table is unchanged in that case.
    pub fn unregister_module(&mut self, module: ModuleId) -> Result<Vec<SystemId>, RegistryError> {
        let doomed: Vec<(u64, SystemId)> = self
            .entries
            .iter()
            .filter(|(_, desc)| desc.owner() == Some(module))
            .map(|(&seq, desc)| (seq, desc.id))
            .collect();
        if doomed.is_empty() {
            return Err(RegistryError::UnknownModule(module));
        }

        for &(seq, id) in &doomed {
            self.entries.remove(&seq);
            self.index.remove(&id);
        }
        Ok(doomed.into_iter().map(|(_, id)| id).collect())
    }

    /// Returns the descriptor of a system by id.
    #[must_use]
    pub fn get(&self, id: SystemId) -> Option<&SystemDescriptor> {
        self.index.get(&id).and_then(|seq| self.entries.get(seq))
    }

    /// Returns `true` if the system is registered.
    #[must_use]
    pub fn contains(&self, id: SystemId) -> bool {
        self.index.contains_key(&id)
    }

    /// Returns the ids of systems owned by `module`, in registration order.
    #[must_use]
    pub fn systems_of(&self, module: ModuleId) -> Vec<SystemId> {
        self.iter()
            .filter(|desc| desc.owner() == Some(module))
            .map(SystemDescriptor::id)
            .collect()
    }

    /// Iterates descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SystemDescriptor> {
        self.entries.values()
    }

    /// Copies out all descriptors in registration order.
    ///
    /// Bodies are shared, not copied.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SystemDescriptor> {
        self.iter().cloned().collect()
    }

    /// Returns the number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::TickContext;

    use super::*;

    fn make_descriptor(name: &str) -> SystemDescriptor {
        SystemDescriptor::new(name, |_: &TickContext| Ok(()))
    }

    #[test]
    fn test_register_assigns_increasing_ids() {
        let mut table = DescriptorTable::new();
        let a = table.register(make_descriptor("physics")).unwrap();
        let b = table.register(make_descriptor("ai")).unwrap();
        assert_eq!(a, SystemId(1));
        assert_eq!(b, SystemId(2));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a).map(SystemDescriptor::name), Some("physics"));
    }

    #[test]
    fn test_register_explicit_id() {
        let mut table = DescriptorTable::new();
        let id = table
            .register(make_descriptor("physics").with_id(SystemId(10)))
            .unwrap();
        assert_eq!(id, SystemId(10));
        assert!(table.contains(SystemId(10)));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut table = DescriptorTable::new();
        table
            .register(make_descriptor("physics").with_id(SystemId(3)))
            .unwrap();
        let err = table
            .register(make_descriptor("ai").with_id(SystemId(3)))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId(SystemId(3)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_assigned_ids_skip_explicit_ones() {
        let mut table = DescriptorTable::new();
        table
            .register(make_descriptor("a").with_id(SystemId(1)))
            .unwrap();
        let b = table.register(make_descriptor("b")).unwrap();
        assert_eq!(b, SystemId(2));
    }

    #[test]
    fn test_unregister_unknown_system() {
        let mut table = DescriptorTable::new();
        assert_eq!(
            table.unregister(SystemId(42)).unwrap_err(),
            RegistryError::UnknownSystem(SystemId(42))
        );
    }

    #[test]
    fn test_snapshot_is_in_registration_order() {
        let mut table = DescriptorTable::new();
        table
            .register(make_descriptor("late").with_id(SystemId(9)))
            .unwrap();
        table
            .register(make_descriptor("early").with_id(SystemId(1)))
            .unwrap();
        let names: Vec<String> = table
            .snapshot()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["late", "early"]);
    }

    #[test]
    fn test_reregistration_goes_to_the_back() {
        let mut table = DescriptorTable::new();
        let a = table.register(make_descriptor("a")).unwrap();
        table.register(make_descriptor("b")).unwrap();
        let desc = table.unregister(a).unwrap();
        table.register(desc).unwrap();
        let ids: Vec<SystemId> = table.iter().map(SystemDescriptor::id).collect();
        assert_eq!(ids, vec![SystemId(2), SystemId(1)]);
    }

    #[test]
    fn test_unregister_module_removes_all_owned() {
        let mods = ModuleId::from_name("mods/zombies");
        let mut table = DescriptorTable::new();
        let a = table.register(make_descriptor("spawn").with_owner(mods)).unwrap();
        let core = table.register(make_descriptor("physics")).unwrap();
        let b = table.register(make_descriptor("bite").with_owner(mods)).unwrap();

        assert_eq!(table.systems_of(mods), vec![a, b]);
        assert_eq!(table.unregister_module(mods).unwrap(), vec![a, b]);
        assert_eq!(table.len(), 1);
        assert!(table.contains(core));
        assert!(!table.contains(a));
        assert_eq!(
            table.unregister_module(mods).unwrap_err(),
            RegistryError::UnknownModule(mods)
        );
    }
}
