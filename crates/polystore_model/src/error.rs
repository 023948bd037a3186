//! Error types for the mapping model.

use thiserror::Error;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors raised while building or querying the entity model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// No entity is registered under the given name.
    #[error("persistent entity not found: {name}")]
    EntityNotFound {
        /// Name that was looked up.
        name: String,
    },

    /// Two properties of one entity share a name.
    #[error("duplicate property {property} on entity {entity}")]
    DuplicateProperty {
        /// Owning entity.
        entity: String,
        /// Offending property name.
        property: String,
    },

    /// The entity was declared without an identity property.
    #[error("entity {entity} declares no identity property")]
    MissingIdentity {
        /// Entity name.
        entity: String,
    },

    /// The version property is missing or not a long-valued property.
    #[error("invalid version property {property} on entity {entity}")]
    InvalidVersionProperty {
        /// Entity name.
        entity: String,
        /// Declared version property.
        property: String,
    },

    /// A different type is already registered under this entity name.
    #[error("entity name {name} is already registered for another type")]
    NameConflict {
        /// Entity name.
        name: String,
    },

    /// The accessor table registered for an entity belongs to another type.
    #[error("accessor table for entity {entity} does not match the requested type")]
    AccessorMismatch {
        /// Entity name.
        entity: String,
    },

    /// An identifier could not be converted to the requested key type.
    #[error("identifier {actual} cannot be used as a {expected} key")]
    IdentifierType {
        /// Expected key type.
        expected: &'static str,
        /// Rendered identifier.
        actual: String,
    },
}

impl MappingError {
    /// Creates an entity-not-found error.
    pub fn entity_not_found(name: impl Into<String>) -> Self {
        Self::EntityNotFound { name: name.into() }
    }

    /// Creates a duplicate property error.
    pub fn duplicate_property(entity: impl Into<String>, property: impl Into<String>) -> Self {
        Self::DuplicateProperty {
            entity: entity.into(),
            property: property.into(),
        }
    }

    /// Creates a missing identity error.
    pub fn missing_identity(entity: impl Into<String>) -> Self {
        Self::MissingIdentity {
            entity: entity.into(),
        }
    }

    /// Creates an invalid version property error.
    pub fn invalid_version_property(
        entity: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self::InvalidVersionProperty {
            entity: entity.into(),
            property: property.into(),
        }
    }

    /// Creates an identifier type error.
    pub fn identifier_type(expected: &'static str, actual: impl Into<String>) -> Self {
        Self::IdentifierType {
            expected,
            actual: actual.into(),
        }
    }
}
