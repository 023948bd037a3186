//! The in-memory entry backend.

use crate::buffer::{MapTransaction, TxBuffer};
use crate::store::{MapEntry, MapStore, VersionGuard};
use parking_lot::Mutex;
use polystore_core::{
    CoreError, CoreResult, EntryBackend, EntryValue, SessionId, TransactionResource,
};
use polystore_model::{PersistentEntity, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Backend bound to one session over a shared [`MapStore`].
///
/// Outside a transaction, writes go straight to the store. Inside one they
/// are buffered and overlaid on this session's reads until commit.
#[derive(Debug)]
pub struct MapBackend {
    store: Arc<MapStore>,
    session: SessionId,
    transaction: Arc<Mutex<Option<Arc<TxBuffer>>>>,
}

impl MapBackend {
    /// Creates a backend for `session`.
    #[must_use]
    pub fn new(store: Arc<MapStore>, session: SessionId) -> Self {
        Self {
            store,
            session,
            transaction: Arc::new(Mutex::new(None)),
        }
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<MapStore> {
        &self.store
    }

    /// The session this backend belongs to.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Whether a transaction is open on this backend.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction.lock().is_some()
    }

    fn pending(&self) -> Option<Arc<TxBuffer>> {
        self.transaction.lock().clone()
    }

    fn scan(&self, entity: &PersistentEntity, limit: Option<usize>) -> Vec<(i64, MapEntry)> {
        self.store.register(entity);
        match self.pending() {
            None => self.store.scan(entity.name(), limit),
            Some(buffer) => {
                let mut rows = buffer.overlay_scan(entity.name(), self.store.scan(entity.name(), None));
                if let Some(limit) = limit {
                    rows.truncate(limit);
                }
                rows
            }
        }
    }
}

impl EntryBackend for MapBackend {
    type Entry = MapEntry;
    type Key = i64;

    fn create_new_entry(&self, _entity: &PersistentEntity) -> MapEntry {
        MapEntry::new()
    }

    fn retrieve_entry(&self, entity: &PersistentEntity, key: &i64) -> CoreResult<Option<MapEntry>> {
        let committed = self.store.get(entity.name(), *key);
        Ok(match self.pending() {
            Some(buffer) => buffer.overlay(entity.name(), *key, committed),
            None => committed,
        })
    }

    fn store_entry(&self, entity: &PersistentEntity, key: &i64, entry: MapEntry) -> CoreResult<i64> {
        self.store.register(entity);
        match self.pending() {
            Some(buffer) => buffer.put(entity.name(), *key, entry),
            None => self.store.put(entity.name(), *key, entry),
        }
        Ok(*key)
    }

    fn update_entry(&self, entity: &PersistentEntity, key: &i64, entry: MapEntry) -> CoreResult<()> {
        self.store.register(entity);
        match self.pending() {
            Some(buffer) => buffer.merge(entity.name(), *key, entry, None),
            None => self.store.merge(entity.name(), *key, entry),
        }
        Ok(())
    }

    /// Outside a transaction the version is compared and the entry merged
    /// under one table lock. Inside one, the expected version travels with
    /// the buffered write and is compared again at commit.
    fn update_versioned_entry(
        &self,
        entity: &PersistentEntity,
        key: &i64,
        entry: MapEntry,
        version_field: &str,
        expected: i64,
    ) -> CoreResult<()> {
        self.store.register(entity);
        let guard = VersionGuard::new(version_field, expected);
        match self.pending() {
            Some(buffer) => buffer.merge(entity.name(), *key, entry, Some(guard)),
            None => self
                .store
                .merge_checked(entity.name(), *key, entry, &guard)?,
        }
        Ok(())
    }

    fn delete_entry(&self, entity: &PersistentEntity, key: &i64) -> CoreResult<bool> {
        match self.pending() {
            Some(buffer) => {
                let existed = self.retrieve_entry(entity, key)?.is_some();
                buffer.delete(entity.name(), *key);
                Ok(existed)
            }
            None => Ok(self.store.remove(entity.name(), *key).is_some()),
        }
    }

    fn get_entry_value(&self, entry: &MapEntry, field: &str) -> EntryValue {
        entry.get(field).cloned().into()
    }

    fn set_entry_value(&self, entry: &mut MapEntry, field: &str, value: Value) {
        entry.insert(field.to_string(), value);
    }

    fn entry_property_names(&self, entry: &MapEntry) -> Vec<String> {
        entry.keys().cloned().collect()
    }

    fn generate_identifier(&self, entity: &PersistentEntity, _entry: &MapEntry) -> CoreResult<i64> {
        Ok(self.store.next_key(entity.name()))
    }

    fn list_entries(
        &self,
        entity: &PersistentEntity,
        limit: Option<usize>,
    ) -> CoreResult<Vec<(i64, MapEntry)>> {
        Ok(self.scan(entity, limit))
    }

    /// Served from the secondary index when `field` is indexed and no
    /// transaction is open; otherwise scans the records this session sees.
    fn find_entries(
        &self,
        entity: &PersistentEntity,
        field: &str,
        value: &Value,
        limit: Option<usize>,
    ) -> CoreResult<Vec<(i64, MapEntry)>> {
        self.store.register(entity);
        if self.pending().is_none() {
            if let Some(found) = self.store.find_indexed(entity.name(), field, value, limit) {
                trace!(entity = entity.name(), field, "index lookup");
                return Ok(found);
            }
        }
        Ok(self
            .scan(entity, None)
            .into_iter()
            .filter(|(_, entry)| entry.get(field) == Some(value))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    fn supports_locking(&self) -> bool {
        true
    }

    fn lock_entry(&self, entity: &PersistentEntity, key: &i64, timeout: Duration) -> CoreResult<()> {
        self.store
            .locks()
            .acquire(entity.name(), *key, self.session, timeout)
    }

    fn unlock_entry(&self, entity: &PersistentEntity, key: &i64) -> CoreResult<()> {
        self.store.locks().release(entity.name(), *key, self.session);
        Ok(())
    }

    fn is_entry_locked(&self, entity: &PersistentEntity, key: &i64) -> CoreResult<bool> {
        Ok(self.store.locks().is_locked(entity.name(), *key))
    }

    fn begin_transaction(&self) -> CoreResult<Box<dyn TransactionResource>> {
        let mut slot = self.transaction.lock();
        if slot.is_some() {
            return Err(CoreError::invalid_operation(
                "a transaction is already open on this session",
            ));
        }
        let buffer = Arc::new(TxBuffer::default());
        *slot = Some(Arc::clone(&buffer));
        trace!(session = %self.session, "opened transaction buffer");
        Ok(Box::new(MapTransaction {
            store: Arc::clone(&self.store),
            buffer,
            slot: Arc::clone(&self.transaction),
        }))
    }

    fn release(&self) {
        let locks = self.store.locks().release_all(self.session);
        let discarded = self
            .transaction
            .lock()
            .take()
            .map_or(0, |buffer| buffer.discard());
        debug!(session = %self.session, locks, discarded, "released backend");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_model::{PersistentProperty, PropertyType};

    fn person() -> PersistentEntity {
        PersistentEntity::builder("person")
            .identity("id", PropertyType::I64)
            .property(PersistentProperty::new("name", PropertyType::String).indexed())
            .build()
            .unwrap()
    }

    fn named(name: &str) -> MapEntry {
        MapEntry::from([("name".to_string(), Value::from(name))])
    }

    fn backends() -> (MapBackend, MapBackend) {
        let store = Arc::new(MapStore::new());
        (
            MapBackend::new(Arc::clone(&store), SessionId::new(1)),
            MapBackend::new(store, SessionId::new(2)),
        )
    }

    #[test]
    fn writes_outside_transaction_are_shared() {
        let (a, b) = backends();
        let entity = person();
        let key = a.generate_identifier(&entity, &MapEntry::new()).unwrap();
        a.store_entry(&entity, &key, named("x")).unwrap();
        assert_eq!(b.retrieve_entry(&entity, &key).unwrap(), Some(named("x")));
        assert!(b.delete_entry(&entity, &key).unwrap());
        assert!(!a.delete_entry(&entity, &key).unwrap());
    }

    #[test]
    fn transaction_isolates_until_commit() {
        let (a, b) = backends();
        let entity = person();
        let mut txn = a.begin_transaction().unwrap();
        assert!(a.in_transaction());
        assert!(a.begin_transaction().is_err());

        a.store_entry(&entity, &1, named("x")).unwrap();
        assert!(a.retrieve_entry(&entity, &1).unwrap().is_some());
        assert!(b.retrieve_entry(&entity, &1).unwrap().is_none());
        assert_eq!(a.list_entries(&entity, None).unwrap().len(), 1);
        assert_eq!(
            a.find_entries(&entity, "name", &Value::from("x"), None)
                .unwrap()
                .len(),
            1
        );

        txn.commit().unwrap();
        assert!(!a.in_transaction());
        assert!(b.retrieve_entry(&entity, &1).unwrap().is_some());
    }

    #[test]
    fn rollback_discards() {
        let (a, _) = backends();
        let entity = person();
        a.store_entry(&entity, &1, named("kept")).unwrap();

        let mut txn = a.begin_transaction().unwrap();
        assert!(a.delete_entry(&entity, &1).unwrap());
        assert!(a.retrieve_entry(&entity, &1).unwrap().is_none());
        a.store_entry(&entity, &2, named("lost")).unwrap();
        txn.rollback().unwrap();

        assert_eq!(a.retrieve_entry(&entity, &1).unwrap(), Some(named("kept")));
        assert!(a.retrieve_entry(&entity, &2).unwrap().is_none());
    }

    #[test]
    fn update_merges() {
        let (a, _) = backends();
        let entity = person();
        a.store_entry(
            &entity,
            &1,
            MapEntry::from([
                ("name".to_string(), Value::from("x")),
                ("extra".to_string(), Value::Long(1)),
            ]),
        )
        .unwrap();
        a.update_entry(&entity, &1, named("y")).unwrap();
        let stored = a.retrieve_entry(&entity, &1).unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&Value::from("y")));
        assert_eq!(stored.get("extra"), Some(&Value::Long(1)));
    }

    #[test]
    fn find_uses_index_and_scan() {
        let (a, _) = backends();
        let entity = person();
        a.store_entry(
            &entity,
            &1,
            MapEntry::from([
                ("name".to_string(), Value::from("x")),
                ("other".to_string(), Value::Long(7)),
            ]),
        )
        .unwrap();
        a.store_entry(&entity, &2, named("x")).unwrap();

        let by_index = a
            .find_entries(&entity, "name", &Value::from("x"), Some(1))
            .unwrap();
        assert_eq!(by_index.len(), 1);
        let by_scan = a
            .find_entries(&entity, "other", &Value::Long(7), None)
            .unwrap();
        assert_eq!(by_scan.len(), 1);
        assert_eq!(by_scan[0].0, 1);
    }

    fn versioned(name: &str, version: i64) -> MapEntry {
        MapEntry::from([
            ("name".to_string(), Value::from(name)),
            ("version".to_string(), Value::Long(version)),
        ])
    }

    #[test]
    fn concurrent_versioned_commit_fails() {
        let (a, b) = backends();
        let entity = person();
        a.store_entry(&entity, &1, versioned("base", 0)).unwrap();

        let mut txn = a.begin_transaction().unwrap();
        a.update_versioned_entry(&entity, &1, versioned("from a", 1), "version", 0)
            .unwrap();
        b.update_versioned_entry(&entity, &1, versioned("from b", 1), "version", 0)
            .unwrap();

        let err = txn.commit().unwrap_err();
        assert!(matches!(
            err,
            CoreError::OptimisticLocking {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert!(!a.in_transaction());
        assert_eq!(b.retrieve_entry(&entity, &1).unwrap(), Some(versioned("from b", 1)));
    }

    #[test]
    fn direct_versioned_update_checks_under_lock() {
        let (a, _) = backends();
        let entity = person();
        a.store_entry(&entity, &1, versioned("base", 3)).unwrap();
        assert!(matches!(
            a.update_versioned_entry(&entity, &1, versioned("stale", 3), "version", 2),
            Err(CoreError::OptimisticLocking { .. })
        ));
        a.update_versioned_entry(&entity, &1, versioned("fresh", 4), "version", 3)
            .unwrap();
        assert_eq!(a.retrieve_entry(&entity, &1).unwrap(), Some(versioned("fresh", 4)));
    }

    #[test]
    fn locks_are_owned_per_session_and_released() {
        let (a, b) = backends();
        let entity = person();
        a.lock_entry(&entity, &1, Duration::ZERO).unwrap();
        assert!(b.is_entry_locked(&entity, &1).unwrap());
        assert!(matches!(
            b.lock_entry(&entity, &1, Duration::from_millis(10)),
            Err(CoreError::LockTimeout { .. })
        ));
        b.unlock_entry(&entity, &1).unwrap();
        assert!(a.is_entry_locked(&entity, &1).unwrap());

        a.begin_transaction().unwrap();
        a.release();
        assert!(!a.is_entry_locked(&entity, &1).unwrap());
        assert!(!a.in_transaction());
        b.lock_entry(&entity, &1, Duration::ZERO).unwrap();
    }
}
