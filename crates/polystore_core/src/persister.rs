//! Entity persister: moves domain objects in and out of native entries.
//!
//! The persister is parameterised by an [`EntryBackend`] and does all the
//! work that is the same for every backend:
//!
//! - identifier generation on first store, exactly once per object
//! - value coercion in both directions through each property's [`ValueKind`]
//! - eager resolution of reference properties, one level deep
//! - optimistic version checks for versioned entities
//!
//! Objects are reached through [`EntityAccess`], so the same persister
//! serves typed entities and schemaless [`Record`]s.

use crate::backend::{EntryBackend, EntryValue};
use crate::error::{CoreError, CoreResult};
use polystore_model::{
    AccessorTable, Entity, EntityAccess, Identifier, MappingContext, MappingError,
    PersistentEntity, PersistentProperty, Record, Value, ValueKind,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Reference properties are resolved at this depth only.
const RESOLVE_DEPTH: u8 = 0;

/// Per-entity persistence engine.
pub struct EntityPersister<B: EntryBackend> {
    entity: Arc<PersistentEntity>,
    context: Arc<MappingContext>,
    backend: Arc<B>,
}

impl<B: EntryBackend> EntityPersister<B> {
    /// Creates a persister for `entity`.
    pub fn new(
        entity: Arc<PersistentEntity>,
        context: Arc<MappingContext>,
        backend: Arc<B>,
    ) -> Self {
        Self {
            entity,
            context,
            backend,
        }
    }

    /// The entity this persister serves.
    #[must_use]
    pub fn entity(&self) -> &Arc<PersistentEntity> {
        &self.entity
    }

    /// The backend entries are written to.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Stores an object: inserts it when it has no identifier, updates it
    /// otherwise. Returns the identifier.
    pub fn persist(&self, access: &mut dyn EntityAccess) -> CoreResult<Identifier> {
        match access.identifier() {
            Some(id) => {
                self.update(&id, access)?;
                Ok(id)
            }
            None => self.insert(access),
        }
    }

    fn insert(&self, access: &mut dyn EntityAccess) -> CoreResult<Identifier> {
        let entity = self.entity.as_ref();
        let mut entry = self.backend.create_new_entry(entity);
        let key = self.backend.generate_identifier(entity, &entry)?;

        self.write_entry(&mut entry, access);
        if let Some(version) = entity.version_property() {
            self.backend
                .set_entry_value(&mut entry, version.mapping().target_name(), Value::Long(0));
        }

        let key = self.backend.store_entry(entity, &key, entry)?;
        let id: Identifier = key.into();
        if let Some(version) = entity.version_property() {
            access.set_property_value(version.name(), Value::Long(0));
        }
        access.set_identifier(id.clone());

        debug!(entity = entity.name(), id = %id, "inserted entry");
        Ok(id)
    }

    /// Writes every declared property of `access` to the entry stored
    /// under `id`, creating the entry if it does not exist.
    pub fn update(&self, id: &Identifier, access: &mut dyn EntityAccess) -> CoreResult<()> {
        let entity = self.entity.as_ref();
        let key = self.key(id)?;
        let existing = self.backend.retrieve_entry(entity, &key)?;
        let found = existing.is_some();
        let mut entry = match existing {
            Some(entry) => entry,
            None => self.backend.create_new_entry(entity),
        };

        let next_version = match entity.version_property() {
            Some(version) => Some((version, self.next_version(version, id, &entry, found, access)?)),
            None => None,
        };

        self.write_entry(&mut entry, access);
        if let Some((version, next)) = next_version {
            self.backend
                .set_entry_value(&mut entry, version.mapping().target_name(), Value::Long(next));
        }

        match (found, next_version) {
            (true, Some((version, next))) => self.backend.update_versioned_entry(
                entity,
                &key,
                entry,
                version.mapping().target_name(),
                next - 1,
            )?,
            (true, None) => self.backend.update_entry(entity, &key, entry)?,
            (false, _) => {
                self.backend.store_entry(entity, &key, entry)?;
            }
        }
        if let Some((version, next)) = next_version {
            access.set_property_value(version.name(), Value::Long(next));
        }

        debug!(entity = entity.name(), id = %id, created = !found, "updated entry");
        Ok(())
    }

    fn next_version(
        &self,
        version: &PersistentProperty,
        id: &Identifier,
        entry: &B::Entry,
        found: bool,
        access: &dyn EntityAccess,
    ) -> CoreResult<i64> {
        if !found {
            return Ok(0);
        }
        let stored = self
            .backend
            .get_entry_value(entry, version.mapping().target_name())
            .into_value()
            .and_then(|v| version.mapping().kind().from_native(v).as_long())
            .unwrap_or(0);
        let held = access
            .property_value(version.name())
            .as_long()
            .unwrap_or(0);

        if stored != held {
            warn!(
                entity = self.entity.name(),
                id = %id,
                expected = held,
                actual = stored,
                "stale version"
            );
            return Err(CoreError::optimistic_locking(
                self.entity.name(),
                id.to_string(),
                held,
                stored,
            ));
        }
        Ok(stored + 1)
    }

    fn write_entry(&self, entry: &mut B::Entry, access: &dyn EntityAccess) {
        if self.entity.is_schemaless() {
            for name in access.property_names() {
                let value = access.property_value(&name);
                let native = ValueKind::of(&value).to_native(value);
                self.backend.set_entry_value(entry, &name, native);
            }
            return;
        }

        let version = self.entity.version_property().map(PersistentProperty::name);
        for property in self.entity.persistent_properties() {
            if property.is_inherited() || Some(property.name()) == version {
                continue;
            }
            let value = access.property_value(property.name());
            let native = property.mapping().kind().to_native(value);
            trace!(
                entity = self.entity.name(),
                property = property.name(),
                kind = ?property.mapping().kind(),
                "write"
            );
            self.backend
                .set_entry_value(entry, property.mapping().target_name(), native);
        }
    }

    fn read_entry(
        &self,
        key: &B::Key,
        entry: &B::Entry,
        access: &mut dyn EntityAccess,
        depth: u8,
    ) -> CoreResult<()> {
        access.set_identifier(key.clone().into());

        if self.entity.is_schemaless() {
            for name in self.backend.entry_property_names(entry) {
                if let EntryValue::Present(value) = self.backend.get_entry_value(entry, &name) {
                    access.set_property_value(&name, value);
                }
            }
            return Ok(());
        }

        for property in self.entity.persistent_properties() {
            let stored = match self
                .backend
                .get_entry_value(entry, property.mapping().target_name())
            {
                EntryValue::Absent => continue,
                EntryValue::Present(stored) => stored,
            };
            let value = match property.referenced_entity() {
                Some(target) if depth == RESOLVE_DEPTH => self.resolve_reference(target, stored)?,
                _ => property.mapping().kind().from_native(stored),
            };
            access.set_property_value(property.name(), value);
        }
        Ok(())
    }

    fn resolve_reference(&self, target: &str, stored: Value) -> CoreResult<Value> {
        let id = match stored {
            Value::Ref(id) => id,
            other => return Ok(ValueKind::Reference.from_native(other)),
        };

        let persister = Self::new(
            self.context.persistent_entity(target)?,
            Arc::clone(&self.context),
            Arc::clone(&self.backend),
        );
        let mut record = Record::new();
        if persister.retrieve_at(&id, &mut record, RESOLVE_DEPTH + 1)? {
            Ok(Value::from(record))
        } else {
            warn!(
                entity = self.entity.name(),
                target_entity = target,
                reference = %id,
                "dangling reference"
            );
            Ok(Value::Null)
        }
    }

    fn retrieve_at(
        &self,
        id: &Identifier,
        access: &mut dyn EntityAccess,
        depth: u8,
    ) -> CoreResult<bool> {
        let Some(key) = self.try_key(id) else {
            return Ok(false);
        };
        match self.backend.retrieve_entry(&self.entity, &key)? {
            Some(entry) => {
                self.read_entry(&key, &entry, access, depth)?;
                Ok(true)
            }
            None => {
                trace!(entity = self.entity.name(), id = %id, "entry not found");
                Ok(false)
            }
        }
    }

    /// Fills `access` from the entry stored under `id`. Returns false if
    /// there is no such entry. Properties absent from the entry keep their
    /// current value.
    pub fn retrieve_into(&self, id: &Identifier, access: &mut dyn EntityAccess) -> CoreResult<bool> {
        self.retrieve_at(id, access, RESOLVE_DEPTH)
    }

    /// Reads the entry stored under `id` as a record.
    pub fn retrieve(&self, id: &Identifier) -> CoreResult<Option<Record>> {
        let mut record = Record::new();
        Ok(self.retrieve_into(id, &mut record)?.then_some(record))
    }

    /// Reads several entries. The result is aligned with `ids`, with `None`
    /// for each identifier that was not found.
    pub fn retrieve_all(&self, ids: &[Identifier]) -> CoreResult<Vec<Option<Record>>> {
        ids.iter().map(|id| self.retrieve(id)).collect()
    }

    /// Deletes the entry stored under `id`. Deleting a missing entry is not
    /// an error; the result says whether anything was deleted.
    pub fn delete(&self, id: &Identifier) -> CoreResult<bool> {
        let Some(key) = self.try_key(id) else {
            return Ok(false);
        };
        let existed = self.backend.delete_entry(&self.entity, &key)?;
        debug!(entity = self.entity.name(), id = %id, existed, "deleted entry");
        Ok(existed)
    }

    /// Locks the entry stored under `id`, waiting at most `timeout`.
    ///
    /// A no-op for backends that do not support locking.
    pub fn lock(&self, id: &Identifier, timeout: Duration) -> CoreResult<()> {
        if !self.backend.supports_locking() {
            trace!(entity = self.entity.name(), "backend has no locking");
            return Ok(());
        }
        let key = self.key(id)?;
        debug!(entity = self.entity.name(), id = %id, ?timeout, "acquiring lock");
        self.backend.lock_entry(&self.entity, &key, timeout)
    }

    /// Releases a lock taken with [`lock`](Self::lock).
    pub fn unlock(&self, id: &Identifier) -> CoreResult<()> {
        if !self.backend.supports_locking() {
            return Ok(());
        }
        let key = self.key(id)?;
        self.backend.unlock_entry(&self.entity, &key)
    }

    /// Whether the entry stored under `id` is locked.
    pub fn is_locked(&self, id: &Identifier) -> CoreResult<bool> {
        match self.try_key(id) {
            Some(key) => self.backend.is_entry_locked(&self.entity, &key),
            None => Ok(false),
        }
    }

    /// Whether the entry backing `object` is locked. Objects that were never
    /// stored are not locked.
    pub fn is_object_locked(&self, object: &dyn EntityAccess) -> CoreResult<bool> {
        match object.identifier() {
            Some(id) => self.is_locked(&id),
            None => Ok(false),
        }
    }

    /// Lists up to `limit` records in key order.
    pub fn list(&self, limit: Option<usize>) -> CoreResult<Vec<Record>> {
        let entries = self.backend.list_entries(&self.entity, limit)?;
        self.materialize(entries, |key, entry| {
            let mut record = Record::new();
            self.read_entry(key, entry, &mut record, RESOLVE_DEPTH)?;
            Ok(record)
        })
    }

    /// Lists up to `limit` typed objects in key order.
    pub fn list_into<T: Entity>(
        &self,
        table: &AccessorTable<T>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<T>> {
        let entries = self.backend.list_entries(&self.entity, limit)?;
        self.materialize(entries, |key, entry| {
            let mut object = T::default();
            self.read_entry(key, entry, &mut table.access(&mut object), RESOLVE_DEPTH)?;
            Ok(object)
        })
    }

    /// Finds records whose `property` equals `value`.
    pub fn find_by(
        &self,
        property: &str,
        value: Value,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Record>> {
        let (field, native) = self.search_field(property, value)?;
        let entries = self
            .backend
            .find_entries(&self.entity, &field, &native, limit)?;
        self.materialize(entries, |key, entry| {
            let mut record = Record::new();
            self.read_entry(key, entry, &mut record, RESOLVE_DEPTH)?;
            Ok(record)
        })
    }

    /// Finds typed objects whose `property` equals `value`.
    pub fn find_into<T: Entity>(
        &self,
        table: &AccessorTable<T>,
        property: &str,
        value: Value,
        limit: Option<usize>,
    ) -> CoreResult<Vec<T>> {
        let (field, native) = self.search_field(property, value)?;
        let entries = self
            .backend
            .find_entries(&self.entity, &field, &native, limit)?;
        self.materialize(entries, |key, entry| {
            let mut object = T::default();
            self.read_entry(key, entry, &mut table.access(&mut object), RESOLVE_DEPTH)?;
            Ok(object)
        })
    }

    fn search_field(&self, property: &str, value: Value) -> CoreResult<(String, Value)> {
        if self.entity.is_schemaless() {
            let native = ValueKind::of(&value).to_native(value);
            return Ok((property.to_string(), native));
        }
        let declared = self
            .entity
            .persistent_properties()
            .iter()
            .find(|p| p.name() == property)
            .ok_or_else(|| {
                CoreError::invalid_operation(format!(
                    "entity {} has no searchable property {property}",
                    self.entity.name()
                ))
            })?;
        Ok((
            declared.mapping().target_name().to_string(),
            declared.mapping().kind().to_native(value),
        ))
    }

    fn materialize<O>(
        &self,
        entries: Vec<(B::Key, B::Entry)>,
        mut fill: impl FnMut(&B::Key, &B::Entry) -> CoreResult<O>,
    ) -> CoreResult<Vec<O>> {
        entries.iter().map(|(key, entry)| fill(key, entry)).collect()
    }

    fn key(&self, id: &Identifier) -> CoreResult<B::Key> {
        self.try_key(id).ok_or_else(|| {
            MappingError::identifier_type(std::any::type_name::<B::Key>(), id.to_string()).into()
        })
    }

    fn try_key(&self, id: &Identifier) -> Option<B::Key> {
        <B::Key as TryFrom<Identifier>>::try_from(id.clone()).ok()
    }
}

impl<B: EntryBackend> std::fmt::Debug for EntityPersister<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityPersister")
            .field("entity", &self.entity.name())
            .finish_non_exhaustive()
    }
}
