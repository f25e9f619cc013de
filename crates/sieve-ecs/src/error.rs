//! Error types.

use sieve_dsl::ParseError;
use thiserror::Error;

use crate::{component::ComponentId, entity::Entity};

/// Error type for world, filter and query operations.
///
/// Every failing operation leaves storage and membership untouched.
#[derive(Debug, Error)]
pub enum EcsError {
    /// A component type was used before being registered.
    #[error("component type not registered: {name}")]
    UnknownComponent {
        /// Rust type name of the component.
        name: &'static str,
    },

    /// A raw component tag that this world never handed out.
    #[error("unknown component id: {0:?}")]
    UnknownComponentId(ComponentId),

    /// A filter referenced a component name nobody registered.
    #[error("unknown component name: {0}")]
    UnknownComponentName(String),

    /// The entity does not hold the requested component.
    #[error("entity {entity} has no {component} component")]
    NotFound {
        /// The entity that was looked up.
        entity: Entity,
        /// Registered name of the component.
        component: String,
    },

    /// The entity is not alive.
    #[error("entity not alive: {0}")]
    DeadEntity(Entity),

    /// A filter has more distinct variables than the minimizer accepts.
    #[error("filter references {variables} components, limit is {limit}")]
    FilterTooComplex {
        /// Distinct components referenced by the filter.
        variables: usize,
        /// Configured variable limit.
        limit: usize,
    },

    /// A component type was registered twice.
    #[error("component type already registered: {name}")]
    DuplicateRegistration {
        /// Rust type name of the component.
        name: &'static str,
    },

    /// Two component types were registered under the same name.
    #[error("component name already taken: {name}")]
    DuplicateName {
        /// The contested name.
        name: String,
    },

    /// A type-erased value did not match the component's type.
    #[error("value for {component} is not a {expected}")]
    TypeMismatch {
        /// Registered name of the component.
        component: String,
        /// Rust type name the storage holds.
        expected: &'static str,
    },

    /// Filter syntax error.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Result type for world, filter and query operations.
pub type EcsResult<T> = Result<T, EcsError>;
