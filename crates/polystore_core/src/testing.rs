//! Minimal backend used by this crate's unit tests.

use crate::backend::{EntryBackend, EntryValue, TransactionResource};
use crate::error::{CoreError, CoreResult};
use polystore_model::{
    Identifier, MappingContext, PersistentEntity, PersistentProperty, PropertyType, Value,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

type Fields = BTreeMap<String, Value>;
type Rows = BTreeMap<(String, i64), Fields>;

/// Keeps rows in a mutex. Transactions snapshot the rows and restore the
/// snapshot on rollback.
#[derive(Default)]
pub(crate) struct ScratchBackend {
    rows: Arc<Mutex<Rows>>,
    next: AtomicI64,
    generated: AtomicUsize,
    released: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
}

impl ScratchBackend {
    pub(crate) fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_rollback(&self) {
        self.fail_rollback.store(true, Ordering::SeqCst);
    }

    pub(crate) fn drop_field(&self, entity: &str, id: &Identifier, field: &str) {
        let key = id.as_long().unwrap_or_default();
        if let Some(fields) = self.rows.lock().get_mut(&(entity.to_string(), key)) {
            fields.remove(field);
        }
    }
}

struct Snapshot {
    rows: Arc<Mutex<Rows>>,
    saved: Rows,
    fail: bool,
    fail_rollback: bool,
}

impl TransactionResource for Snapshot {
    fn commit(&mut self) -> CoreResult<()> {
        if self.fail {
            return Err(CoreError::data_access("commit refused"));
        }
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        *self.rows.lock() = std::mem::take(&mut self.saved);
        if self.fail_rollback {
            return Err(CoreError::data_access("rollback refused"));
        }
        Ok(())
    }
}

impl EntryBackend for ScratchBackend {
    type Entry = Fields;
    type Key = i64;

    fn create_new_entry(&self, _entity: &PersistentEntity) -> Fields {
        Fields::new()
    }

    fn retrieve_entry(&self, entity: &PersistentEntity, key: &i64) -> CoreResult<Option<Fields>> {
        Ok(self
            .rows
            .lock()
            .get(&(entity.name().to_string(), *key))
            .cloned())
    }

    fn store_entry(&self, entity: &PersistentEntity, key: &i64, entry: Fields) -> CoreResult<i64> {
        self.rows
            .lock()
            .insert((entity.name().to_string(), *key), entry);
        Ok(*key)
    }

    fn update_entry(&self, entity: &PersistentEntity, key: &i64, entry: Fields) -> CoreResult<()> {
        self.store_entry(entity, key, entry).map(|_| ())
    }

    fn delete_entry(&self, entity: &PersistentEntity, key: &i64) -> CoreResult<bool> {
        Ok(self
            .rows
            .lock()
            .remove(&(entity.name().to_string(), *key))
            .is_some())
    }

    fn get_entry_value(&self, entry: &Fields, field: &str) -> EntryValue {
        entry.get(field).cloned().into()
    }

    fn set_entry_value(&self, entry: &mut Fields, field: &str, value: Value) {
        entry.insert(field.to_string(), value);
    }

    fn entry_property_names(&self, entry: &Fields) -> Vec<String> {
        entry.keys().cloned().collect()
    }

    fn generate_identifier(&self, _entity: &PersistentEntity, _entry: &Fields) -> CoreResult<i64> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn list_entries(
        &self,
        entity: &PersistentEntity,
        limit: Option<usize>,
    ) -> CoreResult<Vec<(i64, Fields)>> {
        let rows = self.rows.lock();
        let matching = rows
            .iter()
            .filter(|((name, _), _)| name == entity.name())
            .map(|((_, key), fields)| (*key, fields.clone()));
        Ok(matching.take(limit.unwrap_or(usize::MAX)).collect())
    }

    fn begin_transaction(&self) -> CoreResult<Box<dyn TransactionResource>> {
        Ok(Box::new(Snapshot {
            rows: Arc::clone(&self.rows),
            saved: self.rows.lock().clone(),
            fail: self.fail_commit.swap(false, Ordering::SeqCst),
            fail_rollback: self.fail_rollback.swap(false, Ordering::SeqCst),
        }))
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// A context with an `owner` entity and a `pet` entity referencing it.
pub(crate) fn pet_and_owner() -> (Arc<MappingContext>, Arc<ScratchBackend>) {
    let context = MappingContext::new();
    context.add_entity(
        PersistentEntity::builder("owner")
            .identity("id", PropertyType::I64)
            .property(PersistentProperty::new("name", PropertyType::String))
            .build()
            .unwrap(),
    );
    context.add_entity(
        PersistentEntity::builder("pet")
            .identity("id", PropertyType::I64)
            .property(PersistentProperty::new("name", PropertyType::String))
            .property(PersistentProperty::new(
                "owner",
                PropertyType::Reference("owner".into()),
            ))
            .build()
            .unwrap(),
    );
    (Arc::new(context), Arc::new(ScratchBackend::default()))
}
