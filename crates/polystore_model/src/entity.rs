//! Persistent entity descriptions.

use crate::error::{MappingError, MappingResult};
use crate::kind::ValueKind;
use crate::property::{PersistentProperty, PropertyType};
use std::collections::HashSet;

/// Name of the identity property of schemaless entities.
pub const SCHEMALESS_IDENTITY: &str = "id";

/// Static description of a stored type.
///
/// An entity is immutable once built. Its invariants are checked by
/// [`EntityBuilder::build`]:
///
/// - exactly one identity property
/// - property names are unique, identity included
/// - the version property, if any, names a declared long-valued property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentEntity {
    name: String,
    backing_type: Option<&'static str>,
    identity: PersistentProperty,
    properties: Vec<PersistentProperty>,
    version: Option<String>,
    schemaless: bool,
}

impl PersistentEntity {
    /// Starts building an entity.
    pub fn builder(name: impl Into<String>) -> EntityBuilder {
        EntityBuilder {
            name: name.into(),
            backing_type: None,
            identity: None,
            properties: Vec::new(),
            version: None,
        }
    }

    /// Creates an entity whose records carry their own field set.
    pub fn schemaless(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut identity = PersistentProperty::new(
            SCHEMALESS_IDENTITY,
            PropertyType::Custom("identifier".to_string()),
        )
        .nullable(false);
        identity.bind_owner(&name);
        Self {
            name,
            backing_type: None,
            identity,
            properties: Vec::new(),
            version: None,
            schemaless: true,
        }
    }

    /// Entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name backing this entity, if it was registered from a type.
    #[must_use]
    pub fn backing_type(&self) -> Option<&'static str> {
        self.backing_type
    }

    /// The identity property.
    #[must_use]
    pub fn identity(&self) -> &PersistentProperty {
        &self.identity
    }

    /// Non-identity properties in declaration order.
    #[must_use]
    pub fn persistent_properties(&self) -> &[PersistentProperty] {
        &self.properties
    }

    /// Looks up a property by name, identity included.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PersistentProperty> {
        if self.identity.name() == name {
            return Some(&self.identity);
        }
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Reference-typed properties.
    pub fn associations(&self) -> impl Iterator<Item = &PersistentProperty> {
        self.properties
            .iter()
            .filter(|p| p.referenced_entity().is_some())
    }

    /// The version property, if the entity is optimistically versioned.
    #[must_use]
    pub fn version_property(&self) -> Option<&PersistentProperty> {
        self.version.as_deref().and_then(|name| self.property(name))
    }

    /// Whether records of this entity carry their own field set.
    #[must_use]
    pub fn is_schemaless(&self) -> bool {
        self.schemaless
    }
}

/// Builder for [`PersistentEntity`].
#[derive(Debug)]
pub struct EntityBuilder {
    name: String,
    backing_type: Option<&'static str>,
    identity: Option<PersistentProperty>,
    properties: Vec<PersistentProperty>,
    version: Option<String>,
}

impl EntityBuilder {
    /// Declares the identity property. A later call replaces an earlier one.
    #[must_use]
    pub fn identity(mut self, name: impl Into<String>, property_type: PropertyType) -> Self {
        self.identity = Some(PersistentProperty::new(name, property_type).nullable(false));
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, property: PersistentProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Names the version property.
    #[must_use]
    pub fn version(mut self, name: impl Into<String>) -> Self {
        self.version = Some(name.into());
        self
    }

    /// Records the Rust type name backing the entity.
    #[must_use]
    pub fn backing_type(mut self, type_name: &'static str) -> Self {
        self.backing_type = Some(type_name);
        self
    }

    /// Checks the invariants and binds every property to its owner.
    pub fn build(self) -> MappingResult<PersistentEntity> {
        let Self {
            name,
            backing_type,
            identity,
            mut properties,
            version,
        } = self;

        let mut identity = identity.ok_or_else(|| MappingError::missing_identity(&name))?;

        let mut seen = HashSet::with_capacity(properties.len() + 1);
        seen.insert(identity.name().to_string());
        for property in &properties {
            if !seen.insert(property.name().to_string()) {
                return Err(MappingError::duplicate_property(&name, property.name()));
            }
        }

        if let Some(version) = &version {
            let valid = properties
                .iter()
                .any(|p| p.name() == version && p.mapping().kind() == ValueKind::Long);
            if !valid {
                return Err(MappingError::invalid_version_property(&name, version));
            }
        }

        identity.bind_owner(&name);
        for property in &mut properties {
            property.bind_owner(&name);
        }

        Ok(PersistentEntity {
            name,
            backing_type,
            identity,
            properties,
            version,
            schemaless: false,
        })
    }
}
