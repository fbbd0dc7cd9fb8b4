//! Component-layer error types.

use crate::component::ComponentTypeId;

/// Errors raised by the component type registry.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// Two distinct names hash to the same id.
    #[error("component name collision on {id}: `{existing}` and `{incoming}`")]
    NameCollision {
        /// The contested id.
        id: ComponentTypeId,
        /// The name registered first.
        existing: String,
        /// The name that was rejected.
        incoming: String,
    },
}
