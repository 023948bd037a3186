//! Entity access: reading and writing live domain objects.
//!
//! Typed entities describe themselves once through [`Entity::mapping`],
//! pairing each property with a getter and a setter. The resulting
//! [`AccessorTable`] is built at registration time and shared, so no
//! per-call lookup by naming convention ever happens.

use crate::entity::{EntityBuilder, PersistentEntity};
use crate::error::MappingResult;
use crate::identifier::Identifier;
use crate::property::{PersistentProperty, PropertyType};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;

/// Structural access to one live domain object.
pub trait EntityAccess {
    /// Returns the identifier, if one has been assigned.
    fn identifier(&self) -> Option<Identifier>;

    /// Assigns the identifier.
    fn set_identifier(&mut self, id: Identifier);

    /// Reads a property. Unknown properties read as [`Value::Null`].
    fn property_value(&self, name: &str) -> Value;

    /// Writes a property. Unknown properties are ignored by typed access.
    fn set_property_value(&mut self, name: &str, value: Value);

    /// Names of the properties this object exposes.
    fn property_names(&self) -> Vec<String>;
}

/// A Rust type that can be registered as a persistent entity.
///
/// The mapping names `Self` explicitly so the accessor closures know the
/// type they receive:
///
/// ```
/// use polystore_model::{
///     Entity, EntityMapping, Identifier, MappingContext, PersistentProperty, PropertyType, Value,
/// };
///
/// #[derive(Debug, Default, Clone)]
/// struct Note {
///     id: Option<i64>,
///     body: String,
/// }
///
/// impl Entity for Note {
///     fn mapping() -> EntityMapping<Self> {
///         EntityMapping::<Self>::new(
///             "note",
///             "id",
///             PropertyType::I64,
///             |n| n.id.map(Identifier::Long),
///             |n, id| n.id = id.as_long(),
///         )
///         .property(
///             PersistentProperty::new("body", PropertyType::String),
///             |n| Value::from(n.body.as_str()),
///             |n, v| n.body = v.as_text().unwrap_or_default().to_string(),
///         )
///     }
/// }
///
/// let ctx = MappingContext::new();
/// let entity = ctx.add_persistent_entity::<Note>().unwrap();
/// assert!(entity.property("body").is_some());
/// ```
pub trait Entity: Default + Clone + Send + Sync + 'static {
    /// Declares the entity and its accessors.
    fn mapping() -> EntityMapping<Self>;
}

/// Reads a property from a typed object.
pub type Getter<T> = fn(&T) -> Value;

/// Writes a property to a typed object.
pub type Setter<T> = fn(&mut T, Value);

/// Declaration of a typed entity: its model plus accessor functions.
pub struct EntityMapping<T> {
    builder: EntityBuilder,
    get_id: fn(&T) -> Option<Identifier>,
    set_id: fn(&mut T, Identifier),
    accessors: Vec<(String, Getter<T>, Setter<T>)>,
}

impl<T: 'static> EntityMapping<T> {
    /// Starts a mapping with the entity name and its identity accessors.
    pub fn new(
        name: impl Into<String>,
        identity: impl Into<String>,
        identity_type: PropertyType,
        get_id: fn(&T) -> Option<Identifier>,
        set_id: fn(&mut T, Identifier),
    ) -> Self {
        Self {
            builder: PersistentEntity::builder(name)
                .identity(identity, identity_type)
                .backing_type(std::any::type_name::<T>()),
            get_id,
            set_id,
            accessors: Vec::new(),
        }
    }

    /// Adds a property with its getter and setter.
    #[must_use]
    pub fn property(mut self, property: PersistentProperty, get: Getter<T>, set: Setter<T>) -> Self {
        self.accessors.push((property.name().to_string(), get, set));
        self.builder = self.builder.property(property);
        self
    }

    /// Names the version property, which must have been added.
    #[must_use]
    pub fn version(mut self, name: impl Into<String>) -> Self {
        self.builder = self.builder.version(name);
        self
    }

    /// Builds the entity and its accessor table.
    pub fn build(self) -> MappingResult<(PersistentEntity, AccessorTable<T>)> {
        let entity = self.builder.build()?;
        let names = self.accessors.iter().map(|(n, _, _)| n.clone()).collect();
        let accessors = self
            .accessors
            .into_iter()
            .map(|(name, get, set)| (name, (get, set)))
            .collect();
        Ok((
            entity,
            AccessorTable {
                get_id: self.get_id,
                set_id: self.set_id,
                accessors,
                names,
            },
        ))
    }
}

/// Getter and setter pairs for one entity type, keyed by property name.
pub struct AccessorTable<T> {
    get_id: fn(&T) -> Option<Identifier>,
    set_id: fn(&mut T, Identifier),
    accessors: HashMap<String, (Getter<T>, Setter<T>)>,
    names: Vec<String>,
}

impl<T> AccessorTable<T> {
    /// Wraps an object for access through this table.
    pub fn access<'a>(&'a self, object: &'a mut T) -> TypedAccess<'a, T> {
        TypedAccess {
            object,
            table: self,
        }
    }

    /// Reads a property without wrapping the object.
    pub fn get(&self, object: &T, name: &str) -> Value {
        self.accessors
            .get(name)
            .map_or(Value::Null, |(get, _)| get(object))
    }

    /// Reads the identifier without wrapping the object.
    pub fn identifier(&self, object: &T) -> Option<Identifier> {
        (self.get_id)(object)
    }
}

impl<T> fmt::Debug for AccessorTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorTable")
            .field("type", &std::any::type_name::<T>())
            .field("properties", &self.names)
            .finish()
    }
}

/// Entity access over a borrowed typed object.
///
/// Created per operation and dropped when it ends.
pub struct TypedAccess<'a, T> {
    object: &'a mut T,
    table: &'a AccessorTable<T>,
}

impl<T> TypedAccess<'_, T> {
    /// Returns the wrapped object.
    pub fn object(&self) -> &T {
        self.object
    }
}

impl<T> EntityAccess for TypedAccess<'_, T> {
    fn identifier(&self) -> Option<Identifier> {
        (self.table.get_id)(self.object)
    }

    fn set_identifier(&mut self, id: Identifier) {
        (self.table.set_id)(self.object, id);
    }

    fn property_value(&self, name: &str) -> Value {
        self.table.get(self.object, name)
    }

    fn set_property_value(&mut self, name: &str, value: Value) {
        if let Some((_, set)) = self.table.accessors.get(name) {
            set(self.object, value);
        }
    }

    fn property_names(&self) -> Vec<String> {
        self.table.names.clone()
    }
}
