//! Persistent properties and their backend mapping.

use crate::kind::ValueKind;
use std::fmt;

/// Declared type of a persistent property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// UTF-8 string.
    String,
    /// Boolean.
    Bool,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// Single-precision float.
    F32,
    /// Double-precision float.
    F64,
    /// UTC timestamp.
    Timestamp,
    /// Calendar date.
    Date,
    /// Binary payload.
    Bytes,
    /// UUID.
    Uuid,
    /// Reference to a record of the named entity.
    Reference(String),
    /// Any other type, identified by name.
    Custom(String),
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(target) => write!(f, "ref<{target}>"),
            Self::Custom(name) => f.write_str(name),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// How a property is represented by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMapping {
    target_name: String,
    kind: ValueKind,
    indexed: bool,
}

impl PropertyMapping {
    /// Field, column or node-property name used by the backend.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Native kind the value is coerced to.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Whether backends with secondary indexes should index this property.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }
}

/// A single persistent property of an entity.
///
/// Properties are declared with [`PersistentProperty::new`] and the builder
/// setters, then handed to an entity builder. The owner is bound when the
/// entity is built and cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentProperty {
    name: String,
    capitalized_name: String,
    property_type: PropertyType,
    nullable: bool,
    inherited: bool,
    owner: String,
    mapping: PropertyMapping,
}

impl PersistentProperty {
    /// Declares a property of the given type.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        let name = name.into();
        let kind = ValueKind::for_type(&property_type);
        Self {
            capitalized_name: capitalize(&name),
            mapping: PropertyMapping {
                target_name: name.clone(),
                kind,
                indexed: false,
            },
            name,
            property_type,
            nullable: true,
            inherited: false,
            owner: String::new(),
        }
    }

    /// Sets whether the property may be null.
    #[must_use]
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Marks the property as inherited from a parent entity.
    #[must_use]
    pub fn inherited(mut self, value: bool) -> Self {
        self.inherited = value;
        self
    }

    /// Overrides the backend field name.
    #[must_use]
    pub fn column(mut self, target_name: impl Into<String>) -> Self {
        self.mapping.target_name = target_name.into();
        self
    }

    /// Requests a secondary index on this property.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.mapping.indexed = true;
        self
    }

    pub(crate) fn bind_owner(&mut self, owner: &str) {
        debug_assert!(self.owner.is_empty(), "owner bound twice");
        self.owner = owner.to_string();
    }

    /// Property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with the first character upper-cased.
    #[must_use]
    pub fn capitalized_name(&self) -> &str {
        &self.capitalized_name
    }

    /// Declared type.
    #[must_use]
    pub fn property_type(&self) -> &PropertyType {
        &self.property_type
    }

    /// Whether null values are allowed.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the property is inherited.
    #[must_use]
    pub fn is_inherited(&self) -> bool {
        self.inherited
    }

    /// Name of the owning entity.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Backend mapping.
    #[must_use]
    pub fn mapping(&self) -> &PropertyMapping {
        &self.mapping
    }

    /// Target entity name, for reference properties.
    #[must_use]
    pub fn referenced_entity(&self) -> Option<&str> {
        match &self.property_type {
            PropertyType::Reference(target) => Some(target),
            _ => None,
        }
    }
}

/// Upper-cases the first character and leaves the rest unchanged.
#[must_use]
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalize_follows_bean_convention() {
        assert_eq!(capitalize("firstname"), "Firstname");
        assert_eq!(capitalize("lastName"), "LastName");
        assert_eq!(capitalize("URL"), "URL");
        assert_eq!(capitalize("x"), "X");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("éclair"), "Éclair");
    }

    #[test]
    fn new_property_defaults() {
        let prop = PersistentProperty::new("age", PropertyType::I32);
        assert_eq!(prop.name(), "age");
        assert_eq!(prop.capitalized_name(), "Age");
        assert!(prop.is_nullable());
        assert!(!prop.is_inherited());
        assert_eq!(prop.mapping().target_name(), "age");
        assert_eq!(prop.mapping().kind(), ValueKind::Long);
        assert!(!prop.mapping().is_indexed());
    }

    #[test]
    fn mapping_overrides() {
        let prop = PersistentProperty::new("lastName", PropertyType::String)
            .column("last_name")
            .indexed()
            .nullable(false);
        assert_eq!(prop.mapping().target_name(), "last_name");
        assert!(prop.mapping().is_indexed());
        assert!(!prop.is_nullable());
    }

    #[test]
    fn reference_target() {
        let prop = PersistentProperty::new("owner", PropertyType::Reference("person".into()));
        assert_eq!(prop.referenced_entity(), Some("person"));
        assert_eq!(prop.mapping().kind(), ValueKind::Reference);
        assert_eq!(prop.property_type().to_string(), "ref<person>");
    }
}
