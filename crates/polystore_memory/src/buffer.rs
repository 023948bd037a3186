//! Per-session transaction buffer.

use crate::store::{MapEntry, MapStore, VersionGuard};
use parking_lot::Mutex;
use polystore_core::{CoreResult, TransactionResource};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

type WriteKey = (String, i64);

/// A write held back until commit.
///
/// A versioned merge carries the version it was based on, checked again
/// when the write is applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingWrite {
    Put(MapEntry),
    Merge(MapEntry, Option<VersionGuard>),
    Delete,
}

/// Writes made inside an open transaction, invisible to other sessions
/// until applied to the store.
///
/// Only the last write per record is kept, folded with the earlier ones.
#[derive(Debug, Default)]
pub(crate) struct TxBuffer {
    writes: Mutex<BTreeMap<WriteKey, PendingWrite>>,
}

impl TxBuffer {
    pub(crate) fn put(&self, entity: &str, key: i64, entry: MapEntry) {
        self.writes
            .lock()
            .insert((entity.to_string(), key), PendingWrite::Put(entry));
    }

    /// Buffers a merge. Folded onto an earlier merge of the same record, the
    /// earlier guard is kept: it holds the committed version.
    pub(crate) fn merge(
        &self,
        entity: &str,
        key: i64,
        fields: MapEntry,
        guard: Option<VersionGuard>,
    ) {
        let mut writes = self.writes.lock();
        let folded = match writes.remove(&(entity.to_string(), key)) {
            Some(PendingWrite::Put(mut entry)) => {
                entry.extend(fields);
                PendingWrite::Put(entry)
            }
            Some(PendingWrite::Merge(mut earlier, first)) => {
                earlier.extend(fields);
                PendingWrite::Merge(earlier, first.or(guard))
            }
            Some(PendingWrite::Delete) => PendingWrite::Put(fields),
            None => PendingWrite::Merge(fields, guard),
        };
        writes.insert((entity.to_string(), key), folded);
    }

    pub(crate) fn delete(&self, entity: &str, key: i64) {
        self.writes
            .lock()
            .insert((entity.to_string(), key), PendingWrite::Delete);
    }

    /// The record as this transaction sees it.
    pub(crate) fn overlay(
        &self,
        entity: &str,
        key: i64,
        committed: Option<MapEntry>,
    ) -> Option<MapEntry> {
        match self.writes.lock().get(&(entity.to_string(), key)) {
            None => committed,
            Some(write) => fold(committed, write),
        }
    }

    /// Every record of `entity` as this transaction sees it, in key order.
    pub(crate) fn overlay_scan(
        &self,
        entity: &str,
        committed: Vec<(i64, MapEntry)>,
    ) -> Vec<(i64, MapEntry)> {
        let mut rows: BTreeMap<i64, MapEntry> = committed.into_iter().collect();
        let writes = self.writes.lock();
        for ((name, key), write) in writes.iter() {
            if name != entity {
                continue;
            }
            if let Some(entry) = fold(rows.remove(key), write) {
                rows.insert(*key, entry);
            }
        }
        rows.into_iter().collect()
    }

    /// Applies every pending write to `store` at once and empties the
    /// buffer. Nothing is applied if a version guard fails.
    pub(crate) fn apply(&self, store: &MapStore) -> CoreResult<usize> {
        let writes = std::mem::take(&mut *self.writes.lock());
        store.apply(writes)
    }

    pub(crate) fn discard(&self) -> usize {
        let mut writes = self.writes.lock();
        let count = writes.len();
        writes.clear();
        count
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.writes.lock().len()
    }
}

fn fold(committed: Option<MapEntry>, write: &PendingWrite) -> Option<MapEntry> {
    match write {
        PendingWrite::Put(entry) => Some(entry.clone()),
        PendingWrite::Merge(fields, _) => {
            let mut entry = committed.unwrap_or_default();
            entry.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            Some(entry)
        }
        PendingWrite::Delete => None,
    }
}

/// Transaction resource over a [`TxBuffer`].
///
/// Commit applies the buffer to the store, rollback discards it. Either one
/// frees the session's transaction slot.
pub(crate) struct MapTransaction {
    pub(crate) store: Arc<MapStore>,
    pub(crate) buffer: Arc<TxBuffer>,
    pub(crate) slot: Arc<Mutex<Option<Arc<TxBuffer>>>>,
}

impl TransactionResource for MapTransaction {
    fn commit(&mut self) -> CoreResult<()> {
        self.slot.lock().take();
        let applied = self.buffer.apply(&self.store)?;
        debug!(applied, "applied transaction buffer");
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        self.slot.lock().take();
        let discarded = self.buffer.discard();
        debug!(discarded, "discarded transaction buffer");
        Ok(())
    }
}
