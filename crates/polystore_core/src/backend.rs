//! Backend adapter contract.

use crate::error::CoreResult;
use polystore_model::{Identifier, PersistentEntity, Value};
use std::fmt;
use std::time::Duration;

/// A backend's native key type.
///
/// Keys convert into caller-visible [`Identifier`]s and back. An identifier
/// that does not convert is treated as unknown to the backend.
pub trait NativeKey:
    Clone + fmt::Debug + fmt::Display + Send + Sync + 'static + Into<Identifier> + TryFrom<Identifier>
{
}

impl<K> NativeKey for K where
    K: Clone
        + fmt::Debug
        + fmt::Display
        + Send
        + Sync
        + 'static
        + Into<Identifier>
        + TryFrom<Identifier>
{
}

/// Result of reading one field of a native entry.
///
/// `Absent` means the entry has no such field, which is distinct from a
/// field that is present and null.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryValue {
    /// The entry has no such field.
    Absent,
    /// The field is present, possibly null.
    Present(Value),
}

impl EntryValue {
    /// Returns true if the field is absent.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Converts into the present value, if any.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Absent => None,
            Self::Present(value) => Some(value),
        }
    }
}

impl From<Option<Value>> for EntryValue {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Absent, Self::Present)
    }
}

/// A backend transactional resource.
///
/// Each method is called at most once, and never after the other.
pub trait TransactionResource: Send {
    /// Makes the writes buffered since the resource was created visible.
    fn commit(&mut self) -> CoreResult<()>;

    /// Discards the buffered writes.
    fn rollback(&mut self) -> CoreResult<()>;
}

/// Resource for backends without transactional support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransactionResource;

impl TransactionResource for NoopTransactionResource {
    fn commit(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// What a backend implements so the persister can drive it.
///
/// A backend instance is bound to one session. It sees that session's
/// transaction, if any, and owns that session's locks.
///
/// # Invariants
///
/// - `store_entry` followed by `retrieve_entry` with the returned key
///   yields the stored fields
/// - `retrieve_entry` returns `None` for keys never stored or deleted
/// - `delete_entry` never fails because the entry is missing
/// - `get_entry_value` distinguishes an absent field from a present null
pub trait EntryBackend: Send + Sync {
    /// Native entry type.
    type Entry: Send;

    /// Native key type.
    type Key: NativeKey;

    /// Creates an empty entry for `entity`.
    fn create_new_entry(&self, entity: &PersistentEntity) -> Self::Entry;

    /// Fetches an entry by key.
    fn retrieve_entry(
        &self,
        entity: &PersistentEntity,
        key: &Self::Key,
    ) -> CoreResult<Option<Self::Entry>>;

    /// Stores an entry under `key`, replacing any existing one. Returns the
    /// key the entry is stored under.
    fn store_entry(
        &self,
        entity: &PersistentEntity,
        key: &Self::Key,
        entry: Self::Entry,
    ) -> CoreResult<Self::Key>;

    /// Applies `entry` to the stored entry under `key`.
    ///
    /// Backends that support partial update leave fields absent from
    /// `entry` untouched.
    fn update_entry(
        &self,
        entity: &PersistentEntity,
        key: &Self::Key,
        entry: Self::Entry,
    ) -> CoreResult<()>;

    /// Applies `entry` like [`update_entry`](Self::update_entry), provided
    /// the stored `version_field` still holds `expected` when the write
    /// lands. Fails with [`CoreError::OptimisticLocking`] otherwise.
    ///
    /// The persister has already compared versions when this is called.
    /// The default relies on that check alone; backends that can compare
    /// and write atomically, or defer the write to commit, should repeat it
    /// there.
    ///
    /// [`CoreError::OptimisticLocking`]: crate::CoreError::OptimisticLocking
    fn update_versioned_entry(
        &self,
        entity: &PersistentEntity,
        key: &Self::Key,
        entry: Self::Entry,
        _version_field: &str,
        _expected: i64,
    ) -> CoreResult<()> {
        self.update_entry(entity, key, entry)
    }

    /// Deletes an entry. Returns whether it existed.
    fn delete_entry(&self, entity: &PersistentEntity, key: &Self::Key) -> CoreResult<bool>;

    /// Reads one field of an entry.
    fn get_entry_value(&self, entry: &Self::Entry, field: &str) -> EntryValue;

    /// Writes one field of an entry. `value` is already in native form.
    fn set_entry_value(&self, entry: &mut Self::Entry, field: &str, value: Value);

    /// Names of the fields present in an entry.
    fn entry_property_names(&self, entry: &Self::Entry) -> Vec<String>;

    /// Produces the key for a newly persisted entry.
    fn generate_identifier(
        &self,
        entity: &PersistentEntity,
        entry: &Self::Entry,
    ) -> CoreResult<Self::Key>;

    /// Lists entries of `entity` in key order, up to `limit`.
    fn list_entries(
        &self,
        entity: &PersistentEntity,
        limit: Option<usize>,
    ) -> CoreResult<Vec<(Self::Key, Self::Entry)>>;

    /// Finds entries whose `field` equals the native `value`.
    ///
    /// The default scans every entry.
    fn find_entries(
        &self,
        entity: &PersistentEntity,
        field: &str,
        value: &Value,
        limit: Option<usize>,
    ) -> CoreResult<Vec<(Self::Key, Self::Entry)>> {
        let matches = self
            .list_entries(entity, None)?
            .into_iter()
            .filter(|(_, entry)| {
                matches!(self.get_entry_value(entry, field), EntryValue::Present(ref v) if v == value)
            });
        Ok(match limit {
            Some(limit) => matches.take(limit).collect(),
            None => matches.collect(),
        })
    }

    /// Whether `lock_entry` actually locks.
    fn supports_locking(&self) -> bool {
        false
    }

    /// Acquires a pessimistic lock, waiting at most `timeout`.
    fn lock_entry(
        &self,
        _entity: &PersistentEntity,
        _key: &Self::Key,
        _timeout: Duration,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// Releases a lock held by this backend's session.
    fn unlock_entry(&self, _entity: &PersistentEntity, _key: &Self::Key) -> CoreResult<()> {
        Ok(())
    }

    /// Whether any session holds a lock on the entry.
    fn is_entry_locked(&self, _entity: &PersistentEntity, _key: &Self::Key) -> CoreResult<bool> {
        Ok(false)
    }

    /// Starts a backend transaction.
    fn begin_transaction(&self) -> CoreResult<Box<dyn TransactionResource>> {
        Ok(Box::new(NoopTransactionResource))
    }

    /// Called once when the owning session closes.
    fn release(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_value_distinguishes_absent_from_null() {
        assert!(EntryValue::Absent.is_absent());
        assert!(!EntryValue::Present(Value::Null).is_absent());
        assert_eq!(EntryValue::Present(Value::Null).into_value(), Some(Value::Null));
        assert_eq!(EntryValue::from(None), EntryValue::Absent);
    }

    #[test]
    fn noop_resource() {
        let mut resource = NoopTransactionResource;
        assert!(resource.commit().is_ok());
        assert!(resource.rollback().is_ok());
    }
}
