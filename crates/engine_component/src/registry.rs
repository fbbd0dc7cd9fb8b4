//! Component type registry.
//!
//! The scheduler consults a [`ComponentRegistry`] to turn Rust component
//! types into [`ComponentTypeId`]s. [`TypeRegistry`] is the default
//! implementation: ids are the FNV-1a hash of the type name, and the registry
//! remembers which name produced which id so diagnostics can print names and
//! hash collisions are caught at startup rather than showing up as phantom
//! conflicts.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::component::{Component, ComponentTypeId};
use crate::error::ComponentError;

/// Maps component types to stable identifiers.
///
/// The mapping must not change for the lifetime of the process.
pub trait ComponentRegistry {
    /// Returns the identifier of component type `T`.
    fn type_id_of<T: Component>(&self) -> ComponentTypeId;
}

/// Name-hashing component registry.
///
/// Registration takes `&self` and is safe to call from several threads (for
/// example from modules loading in parallel).
#[derive(Debug, Default)]
pub struct TypeRegistry {
    names: DashMap<ComponentTypeId, String>,
}

impl TypeRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register component type `T` and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::NameCollision`] if a different name already
    /// hashed to the same id.
    pub fn register<T: Component>(&self) -> Result<ComponentTypeId, ComponentError> {
        self.register_name(T::type_name())
    }

    /// Register a component by name and return its id.
    ///
    /// Registering the same name twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::NameCollision`] if a different name already
    /// hashed to the same id.
    pub fn register_name(&self, name: &str) -> Result<ComponentTypeId, ComponentError> {
        self.insert(ComponentTypeId::from_name(name), name)
    }

    /// Register a synthetic resource by name and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::NameCollision`] on a hash collision.
    pub fn register_resource(&self, name: &str) -> Result<ComponentTypeId, ComponentError> {
        self.insert(ComponentTypeId::resource(name), &format!("resource:{name}"))
    }

    fn insert(&self, id: ComponentTypeId, name: &str) -> Result<ComponentTypeId, ComponentError> {
        match self.names.entry(id) {
            Entry::Occupied(existing) if existing.get() != name => {
                Err(ComponentError::NameCollision {
                    id,
                    existing: existing.get().clone(),
                    incoming: name.to_string(),
                })
            }
            Entry::Occupied(_) => Ok(id),
            Entry::Vacant(slot) => {
                slot.insert(name.to_string());
                Ok(id)
            }
        }
    }

    /// Returns the registered name of `id`, if any.
    #[must_use]
    pub fn name_of(&self, id: ComponentTypeId) -> Option<String> {
        self.names.get(&id).map(|name| name.value().clone())
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl ComponentRegistry for TypeRegistry {
    fn type_id_of<T: Component>(&self) -> ComponentTypeId {
        ComponentTypeId::of::<T>()
    }
}
