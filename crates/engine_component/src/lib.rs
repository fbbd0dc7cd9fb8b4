//! # engine_component
//!
//! The "C" in ECS as far as scheduling is concerned: what a component type
//! is, how it is identified, and how systems declare access to it.
//!
//! This crate provides:
//!
//! - [`Component`] trait — the contract all ECS data must satisfy.
//! - [`ComponentTypeId`] — stable FNV-1a ids, plus synthetic resource ids.
//! - [`ComponentRegistry`] / [`TypeRegistry`] — type-to-id mapping.
//! - [`AccessDescriptor`] — declarative read/write sets with conflict tests.

pub mod access;
pub mod component;
pub mod error;
pub mod registry;

pub use access::AccessDescriptor;
pub use component::{Component, ComponentTypeId, fnv1a_64};
pub use error::ComponentError;
pub use registry::{ComponentRegistry, TypeRegistry};
