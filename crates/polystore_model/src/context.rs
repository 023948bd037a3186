//! Registry of persistent entities.

use crate::access::{AccessorTable, Entity};
use crate::entity::PersistentEntity;
use crate::error::{MappingError, MappingResult};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

type SharedAccessors = Arc<dyn Any + Send + Sync>;

/// Holds every registered entity and, for typed entities, their accessor
/// tables.
///
/// Registration is idempotent. Entities are never removed or mutated once
/// registered, so lookups hand out shared references.
#[derive(Default)]
pub struct MappingContext {
    entities: RwLock<BTreeMap<String, Arc<PersistentEntity>>>,
    types: RwLock<HashMap<TypeId, String>>,
    accessors: RwLock<HashMap<TypeId, SharedAccessors>>,
}

impl MappingContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed entity, or returns the one already registered for `T`.
    pub fn add_persistent_entity<T: Entity>(&self) -> MappingResult<Arc<PersistentEntity>> {
        let type_id = TypeId::of::<T>();

        let mut entities = self.entities.write();
        let mut types = self.types.write();
        if let Some(name) = types.get(&type_id) {
            if let Some(existing) = entities.get(name) {
                return Ok(Arc::clone(existing));
            }
        }

        let (entity, table) = T::mapping().build()?;
        if entities.contains_key(entity.name()) {
            return Err(MappingError::NameConflict {
                name: entity.name().to_string(),
            });
        }

        let name = entity.name().to_string();
        let entity = Arc::new(entity);
        entities.insert(name.clone(), Arc::clone(&entity));
        types.insert(type_id, name);
        self.accessors.write().insert(type_id, Arc::new(table));
        Ok(entity)
    }

    /// Registers several typed entities.
    pub fn add_persistent_entities(
        &self,
        registrations: &[Registration],
    ) -> MappingResult<Vec<Arc<PersistentEntity>>> {
        registrations.iter().map(|r| (r.register)(self)).collect()
    }

    /// Registers a dynamically built entity. Returns the existing entity if
    /// the name is already taken.
    pub fn add_entity(&self, entity: PersistentEntity) -> Arc<PersistentEntity> {
        let mut entities = self.entities.write();
        Arc::clone(
            entities
                .entry(entity.name().to_string())
                .or_insert_with(|| Arc::new(entity)),
        )
    }

    /// Registers a schemaless entity under `name` unless one exists.
    pub fn add_schemaless_entity(&self, name: &str) -> Arc<PersistentEntity> {
        if let Some(existing) = self.entities.read().get(name) {
            return Arc::clone(existing);
        }
        self.add_entity(PersistentEntity::schemaless(name))
    }

    /// Looks up an entity by name.
    pub fn persistent_entity(&self, name: &str) -> MappingResult<Arc<PersistentEntity>> {
        self.entities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MappingError::entity_not_found(name))
    }

    /// Looks up the entity registered for `T`.
    pub fn persistent_entity_for<T: Entity>(&self) -> MappingResult<Arc<PersistentEntity>> {
        let name = self
            .types
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| MappingError::entity_not_found(std::any::type_name::<T>()))?;
        self.persistent_entity(&name)
    }

    /// Returns the accessor table registered for `T`.
    pub fn accessors<T: Entity>(&self) -> MappingResult<Arc<AccessorTable<T>>> {
        let shared = self
            .accessors
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| MappingError::entity_not_found(std::any::type_name::<T>()))?;
        shared
            .downcast::<AccessorTable<T>>()
            .map_err(|_| MappingError::AccessorMismatch {
                entity: std::any::type_name::<T>().to_string(),
            })
    }

    /// All registered entities, ordered by name.
    pub fn entities(&self) -> Vec<Arc<PersistentEntity>> {
        self.entities.read().values().cloned().collect()
    }

    /// Returns true if an entity is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entities.read().contains_key(name)
    }
}

impl std::fmt::Debug for MappingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingContext")
            .field("entities", &self.entities.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A deferred registration of a typed entity.
#[derive(Clone, Copy)]
pub struct Registration {
    register: fn(&MappingContext) -> MappingResult<Arc<PersistentEntity>>,
}

impl Registration {
    /// Registration for `T`.
    #[must_use]
    pub fn of<T: Entity>() -> Self {
        Self {
            register: MappingContext::add_persistent_entity::<T>,
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Registration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::EntityMapping;
    use crate::identifier::Identifier;
    use crate::property::{PersistentProperty, PropertyType};
    use crate::value::Value;

    #[derive(Debug, Default, Clone)]
    struct Author {
        id: Option<i64>,
        name: String,
    }

    impl Entity for Author {
        fn mapping() -> EntityMapping<Self> {
            EntityMapping::<Self>::new(
                "author",
                "id",
                PropertyType::I64,
                |a| a.id.map(Identifier::Long),
                |a, id| a.id = id.as_long(),
            )
            .property(
                PersistentProperty::new("name", PropertyType::String),
                |a| Value::from(a.name.as_str()),
                |a, v| a.name = v.to_string(),
            )
        }
    }

    #[derive(Debug, Default, Clone)]
    struct Impostor;

    impl Entity for Impostor {
        fn mapping() -> EntityMapping<Self> {
            EntityMapping::<Self>::new("author", "id", PropertyType::I64, |_| None, |_, _| {})
        }
    }

    #[test]
    fn registration_is_idempotent() {
        let ctx = MappingContext::new();
        let first = ctx.add_persistent_entity::<Author>().unwrap();
        let second = ctx.add_persistent_entity::<Author>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(ctx.entities().len(), 1);
    }

    #[test]
    fn name_conflict_between_types() {
        let ctx = MappingContext::new();
        ctx.add_persistent_entities(&[Registration::of::<Author>()])
            .unwrap();
        let err = ctx.add_persistent_entity::<Impostor>().unwrap_err();
        assert_eq!(
            err,
            MappingError::NameConflict {
                name: "author".into()
            }
        );
    }

    #[test]
    fn lookup_by_name_and_type() {
        let ctx = MappingContext::new();
        ctx.add_persistent_entity::<Author>().unwrap();

        assert_eq!(ctx.persistent_entity("author").unwrap().name(), "author");
        assert_eq!(
            ctx.persistent_entity_for::<Author>().unwrap().name(),
            "author"
        );
        assert!(matches!(
            ctx.persistent_entity("nobody"),
            Err(MappingError::EntityNotFound { .. })
        ));
        assert!(ctx.persistent_entity_for::<Impostor>().is_err());
    }

    #[test]
    fn accessors_are_shared() {
        let ctx = MappingContext::new();
        ctx.add_persistent_entity::<Author>().unwrap();
        let table = ctx.accessors::<Author>().unwrap();

        let mut author = Author {
            id: Some(1),
            name: "Le Guin".into(),
        };
        assert_eq!(table.get(&author, "name"), Value::from("Le Guin"));
        assert_eq!(table.identifier(&author), Some(Identifier::Long(1)));

        use crate::access::EntityAccess;
        table
            .access(&mut author)
            .set_property_value("name", Value::from("Butler"));
        assert_eq!(author.name, "Butler");
    }

    #[test]
    fn schemaless_registration() {
        let ctx = MappingContext::new();
        let a = ctx.add_schemaless_entity("persons");
        let b = ctx.add_schemaless_entity("persons");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(ctx.contains("persons"));
        assert!(a.is_schemaless());
    }
}
