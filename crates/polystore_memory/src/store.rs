//! Datastore-scoped record storage.

use crate::buffer::PendingWrite;
use crate::index::PropertyIndex;
use crate::locks::LockTable;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use polystore_core::{CoreError, CoreResult};
use polystore_model::{PersistentEntity, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A stored record: field name to native value.
pub type MapEntry = BTreeMap<String, Value>;

type Table = BTreeMap<i64, MapEntry>;

/// The version a write was based on.
///
/// Checked against the stored record under the table write lock, right
/// before the write lands. A missing version field reads as 0. A missing
/// record passes, and the write recreates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VersionGuard {
    field: String,
    expected: i64,
}

impl VersionGuard {
    pub(crate) fn new(field: impl Into<String>, expected: i64) -> Self {
        Self {
            field: field.into(),
            expected,
        }
    }

    fn check(&self, entity: &str, key: i64, current: Option<&MapEntry>) -> CoreResult<()> {
        let Some(current) = current else {
            return Ok(());
        };
        let actual = current
            .get(&self.field)
            .and_then(Value::as_long)
            .unwrap_or(0);
        if actual == self.expected {
            return Ok(());
        }
        warn!(entity, key, expected = self.expected, actual, "version changed underneath write");
        Err(CoreError::optimistic_locking(
            entity,
            key.to_string(),
            self.expected,
            actual,
        ))
    }
}

/// Records of every entity, with their secondary index, key sequences and
/// lock table.
///
/// One table per entity name behind its own lock, so writers to different
/// entities never contend. Index postings for an entity change under that
/// entity's table write lock.
#[derive(Debug, Default)]
pub struct MapStore {
    tables: DashMap<String, Arc<RwLock<Table>>>,
    index: PropertyIndex,
    sequences: DashMap<String, Arc<AtomicI64>>,
    locks: LockTable,
}

impl MapStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the table for `entity` and indexes its `indexed` properties.
    /// Does nothing if the table exists.
    pub fn register(&self, entity: &PersistentEntity) {
        if self.tables.contains_key(entity.name()) {
            return;
        }
        self.tables
            .entry(entity.name().to_string())
            .or_insert_with(|| {
                for property in entity.persistent_properties() {
                    if property.mapping().is_indexed() {
                        self.index
                            .create(entity.name(), property.mapping().target_name());
                    }
                }
                debug!(entity = entity.name(), "created table");
                Arc::new(RwLock::new(Table::new()))
            });
    }

    fn table(&self, entity: &str) -> Option<Arc<RwLock<Table>>> {
        self.tables.get(entity).map(|t| Arc::clone(t.value()))
    }

    fn table_or_create(&self, entity: &str) -> Arc<RwLock<Table>> {
        Arc::clone(self.tables.entry(entity.to_string()).or_default().value())
    }

    /// Fetches a record.
    #[must_use]
    pub fn get(&self, entity: &str, key: i64) -> Option<MapEntry> {
        self.table(entity)?.read().get(&key).cloned()
    }

    /// Applies one write to a locked table and its index postings. Returns
    /// the record it replaced.
    fn write_row(
        &self,
        entity: &str,
        rows: &mut Table,
        key: i64,
        write: PendingWrite,
    ) -> Option<MapEntry> {
        let previous = match write {
            PendingWrite::Put(entry) => rows.insert(key, entry),
            PendingWrite::Merge(fields, _) => {
                let previous = rows.get(&key).cloned();
                let mut merged = previous.clone().unwrap_or_default();
                merged.extend(fields);
                rows.insert(key, merged);
                previous
            }
            PendingWrite::Delete => rows.remove(&key),
        };
        self.index
            .reindex(entity, key, previous.as_ref(), rows.get(&key));
        previous
    }

    /// Replaces the record under `key`.
    pub fn put(&self, entity: &str, key: i64, entry: MapEntry) {
        let table = self.table_or_create(entity);
        self.write_row(entity, &mut table.write(), key, PendingWrite::Put(entry));
        trace!(entity, key, "put");
    }

    /// Merges `fields` onto the record under `key`, creating it if missing.
    pub fn merge(&self, entity: &str, key: i64, fields: MapEntry) {
        let table = self.table_or_create(entity);
        self.write_row(entity, &mut table.write(), key, PendingWrite::Merge(fields, None));
        trace!(entity, key, "merge");
    }

    /// Merges `fields` like [`merge`](Self::merge) if `guard` still holds.
    pub(crate) fn merge_checked(
        &self,
        entity: &str,
        key: i64,
        fields: MapEntry,
        guard: &VersionGuard,
    ) -> CoreResult<()> {
        let table = self.table_or_create(entity);
        let mut rows = table.write();
        guard.check(entity, key, rows.get(&key))?;
        self.write_row(entity, &mut rows, key, PendingWrite::Merge(fields, None));
        trace!(entity, key, "checked merge");
        Ok(())
    }

    /// Removes a record, returning it if it existed.
    pub fn remove(&self, entity: &str, key: i64) -> Option<MapEntry> {
        let table = self.table(entity)?;
        let removed = self.write_row(entity, &mut table.write(), key, PendingWrite::Delete)?;
        trace!(entity, key, "remove");
        Some(removed)
    }

    /// Applies a batch of writes all at once.
    ///
    /// Every table the batch touches is write-locked, in name order, and
    /// every version guard is checked before anything changes. A failed
    /// guard leaves the store untouched.
    pub(crate) fn apply(&self, writes: BTreeMap<(String, i64), PendingWrite>) -> CoreResult<usize> {
        let mut tables: BTreeMap<String, Arc<RwLock<Table>>> = BTreeMap::new();
        for (entity, _) in writes.keys() {
            if !tables.contains_key(entity) {
                tables.insert(entity.clone(), self.table_or_create(entity));
            }
        }
        let mut locked: BTreeMap<&str, RwLockWriteGuard<'_, Table>> = tables
            .iter()
            .map(|(name, table)| (name.as_str(), table.write()))
            .collect();

        for ((entity, key), write) in &writes {
            if let PendingWrite::Merge(_, Some(guard)) = write {
                let current = locked.get(entity.as_str()).and_then(|rows| rows.get(key));
                guard.check(entity, *key, current)?;
            }
        }

        let count = writes.len();
        for ((entity, key), write) in writes {
            if let Some(rows) = locked.get_mut(entity.as_str()) {
                self.write_row(&entity, rows, key, write);
            }
        }
        trace!(count, tables = tables.len(), "applied batch");
        Ok(count)
    }

    /// Records of `entity` in key order, up to `limit`.
    #[must_use]
    pub fn scan(&self, entity: &str, limit: Option<usize>) -> Vec<(i64, MapEntry)> {
        let Some(table) = self.table(entity) else {
            return Vec::new();
        };
        let rows = table.read();
        rows.iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, entry)| (*key, entry.clone()))
            .collect()
    }

    /// Records whose indexed `field` equals `value`, in key order.
    ///
    /// Returns `None` when `field` is not indexed for `entity`.
    #[must_use]
    pub fn find_indexed(
        &self,
        entity: &str,
        field: &str,
        value: &Value,
        limit: Option<usize>,
    ) -> Option<Vec<(i64, MapEntry)>> {
        let table = self.table(entity)?;
        let rows = table.read();
        let keys = self.index.lookup(entity, field, value)?;
        Some(
            keys.into_iter()
                .filter_map(|key| rows.get(&key).map(|entry| (key, entry.clone())))
                .take(limit.unwrap_or(usize::MAX))
                .collect(),
        )
    }

    /// Whether `field` of `entity` is indexed.
    #[must_use]
    pub fn is_indexed(&self, entity: &str, field: &str) -> bool {
        self.index.is_indexed(entity, field)
    }

    /// Next key for `entity`. Keys start at 1 and are never reused.
    pub fn next_key(&self, entity: &str) -> i64 {
        let sequence = Arc::clone(self.sequences.entry(entity.to_string()).or_default().value());
        sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of records of `entity`.
    #[must_use]
    pub fn len(&self, entity: &str) -> usize {
        self.table(entity).map_or(0, |t| t.read().len())
    }

    /// Whether `entity` has no records.
    #[must_use]
    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }

    /// Names of the entities with a table.
    #[must_use]
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// The lock table shared by every session over this store.
    #[must_use]
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Drops every record, index posting and key sequence. Locks are left to
    /// the sessions holding them.
    pub fn clear(&self) {
        self.tables.clear();
        self.index.clear();
        self.sequences.clear();
        debug!("cleared store");
    }
}
