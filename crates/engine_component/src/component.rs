//! Core [`Component`] trait and component type identity.
//!
//! Every piece of per-entity data the scheduler reasons about is identified
//! by a [`ComponentTypeId`]. The scheduler never touches component data; it
//! only compares ids to decide which systems may run side by side.
//!
//! ## Type Identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm. The mapping is stable for the lifetime
//! of the process and across runs, which keeps plan construction
//! reproducible.

use serde::{Deserialize, Serialize};

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Prefix folded into the hash of synthetic resource ids.
const RESOURCE_PREFIX: &str = "resource:";

/// Continue an FNV-1a 64-bit hash over `bytes`, starting from `hash`.
///
/// ```text
/// for each byte in bytes:
///     hash = hash XOR byte
///     hash = hash * 0x00000100000001b3  (prime)
/// return hash
/// ```
#[must_use]
pub const fn fnv1a_64_from(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// FNV-1a 64-bit hash of `name`'s UTF-8 bytes.
#[must_use]
pub const fn fnv1a_64(name: &str) -> u64 {
    fnv1a_64_from(FNV_OFFSET_BASIS, name.as_bytes())
}

/// A unique identifier for a component type, derived from its string name
/// using the FNV-1a 64-bit hash algorithm.
///
/// Ids are totally ordered so access sets can be kept sorted and
/// intersected in linear time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// Compute the [`ComponentTypeId`] from a component's string name.
    ///
    /// This is the **canonical** way to derive a `ComponentTypeId`.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a_64(name))
    }

    /// Compute the id of a synthetic resource.
    ///
    /// Resources are shared state that is not stored as a component (an
    /// event queue, a physics broadphase, an audio device). Declaring a write
    /// on a resource id serializes every system that touches it. Resource ids
    /// hash `"resource:" + name`, so they never coincide with the component
    /// of the same name.
    #[must_use]
    pub const fn resource(name: &str) -> Self {
        let prefixed = fnv1a_64_from(FNV_OFFSET_BASIS, RESOURCE_PREFIX.as_bytes());
        Self(fnv1a_64_from(prefixed, name.as_bytes()))
    }

    /// Compute the [`ComponentTypeId`] for a Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self::from_name(T::type_name())
    }
}

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentTypeId({:#018x})", self.0)
    }
}

/// The core component trait.
///
/// Components must be `Send + Sync` because systems declaring disjoint
/// access to them run on different worker threads in the same wave.
///
/// # Examples
///
/// ```rust
/// use engine_component::{Component, ComponentTypeId};
///
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
///
/// assert_eq!(Health::component_type_id(), ComponentTypeId::from_name("Health"));
/// ```
pub trait Component: Send + Sync + 'static {
    /// A human-readable name for this component type.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Health;

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    struct Velocity;

    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[test]
    fn test_component_type_id_is_stable() {
        assert_eq!(Health::component_type_id(), Health::component_type_id());
    }

    #[test]
    fn test_component_type_id_matches_from_name() {
        assert_eq!(
            Health::component_type_id(),
            ComponentTypeId::from_name("Health")
        );
        assert_eq!(ComponentTypeId::of::<Health>(), ComponentTypeId::from_name("Health"));
    }

    #[test]
    fn test_component_type_id_differs_between_types() {
        assert_ne!(Health::component_type_id(), Velocity::component_type_id());
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(
            ComponentTypeId::from_name(""),
            ComponentTypeId(0xcbf2_9ce4_8422_2325)
        );
        // Published FNV-1a 64 test vector for "a".
        assert_eq!(fnv1a_64("a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_resource_id_is_namespaced() {
        assert_ne!(
            ComponentTypeId::resource("Health"),
            ComponentTypeId::from_name("Health")
        );
        assert_eq!(
            ComponentTypeId::resource("Health"),
            ComponentTypeId::from_name("resource:Health")
        );
    }
}
