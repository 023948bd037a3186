//! Sessions: one unit of work against a backend.

use crate::backend::EntryBackend;
use crate::config::DatastoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::persister::EntityPersister;
use crate::transaction::{Transaction, TransactionInner, TransactionState};
use crate::types::{SessionId, TransactionId};
use polystore_model::{Entity, Identifier, MappingContext, Record, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

type CacheKey = (String, Identifier);

/// A unit of work.
///
/// A session owns one persister per entity, created on first use, and a
/// first-level cache of the objects it stored or loaded. It is meant to be
/// used from one thread at a time; open one session per thread.
///
/// Closing a session, explicitly with [`disconnect`](Self::disconnect) or by
/// dropping it, rolls back an active transaction and releases the locks the
/// session holds.
pub struct Session<B: EntryBackend> {
    id: SessionId,
    context: Arc<MappingContext>,
    backend: Arc<B>,
    config: DatastoreConfig,
    persisters: HashMap<String, Arc<EntityPersister<B>>>,
    cache: HashMap<CacheKey, Box<dyn Any + Send + Sync>>,
    transaction: Option<Arc<TransactionInner>>,
    last_txid: u64,
    open: bool,
}

impl<B: EntryBackend> Session<B> {
    /// Creates a session over a backend bound to it.
    pub fn new(
        id: SessionId,
        context: Arc<MappingContext>,
        backend: Arc<B>,
        config: DatastoreConfig,
    ) -> Self {
        debug!(session = %id, source = %config.connection_source, "session opened");
        Self {
            id,
            context,
            backend,
            config,
            persisters: HashMap::new(),
            cache: HashMap::new(),
            transaction: None,
            last_txid: 0,
            open: true,
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Configuration the session was opened with.
    #[must_use]
    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    /// The mapping context entities are resolved in.
    #[must_use]
    pub fn mapping_context(&self) -> &Arc<MappingContext> {
        &self.context
    }

    /// The backend bound to this session.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Whether the session is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&mut self) -> CoreResult<()> {
        if !self.open {
            return Err(CoreError::SessionClosed);
        }
        self.observe_transaction();
        Ok(())
    }

    // Forgets a finished transaction. A rollback invalidates the cache.
    fn observe_transaction(&mut self) {
        let finished = self
            .transaction
            .as_ref()
            .map(|t| t.state())
            .filter(|state| *state != TransactionState::Active);
        if let Some(state) = finished {
            self.transaction = None;
            if state == TransactionState::RolledBack {
                trace!(session = %self.id, "clearing cache after rollback");
                self.cache.clear();
            }
        }
    }

    /// Returns the persister for the named entity, creating it on first use.
    pub fn persister(&mut self, entity: &str) -> CoreResult<Arc<EntityPersister<B>>> {
        self.ensure_open()?;
        if let Some(persister) = self.persisters.get(entity) {
            return Ok(Arc::clone(persister));
        }
        let persister = Arc::new(EntityPersister::new(
            self.context.persistent_entity(entity)?,
            Arc::clone(&self.context),
            Arc::clone(&self.backend),
        ));
        trace!(session = %self.id, entity, "created persister");
        self.persisters
            .insert(entity.to_string(), Arc::clone(&persister));
        Ok(persister)
    }

    /// Returns the persister for the entity registered for `T`.
    pub fn persister_for<T: Entity>(&mut self) -> CoreResult<Arc<EntityPersister<B>>> {
        let entity = self.context.persistent_entity_for::<T>()?;
        self.persister(entity.name())
    }

    fn cache_get<T: Clone + 'static>(&self, entity: &str, id: &Identifier) -> Option<T> {
        self.cache
            .get(&(entity.to_string(), id.clone()))
            .and_then(|cached| cached.downcast_ref::<T>())
            .cloned()
    }

    fn cache_put<T: Send + Sync + 'static>(&mut self, entity: &str, id: &Identifier, object: T) {
        if self.config.cache_objects {
            self.cache
                .insert((entity.to_string(), id.clone()), Box::new(object));
        }
    }

    fn cache_evict(&mut self, entity: &str, id: &Identifier) {
        self.cache.remove(&(entity.to_string(), id.clone()));
    }

    // --- record API ---

    /// Stores a record under `entity`, registering a schemaless entity if
    /// the name is unknown. Assigns the record's identifier on first store.
    pub fn store(&mut self, entity: &str, record: &mut Record) -> CoreResult<Identifier> {
        self.ensure_open()?;
        if !self.context.contains(entity) {
            debug!(entity, "registering schemaless entity");
            self.context.add_schemaless_entity(entity);
        }
        let id = self.persister(entity)?.persist(record)?;
        self.cache_put(entity, &id, record.clone());
        Ok(id)
    }

    /// Retrieves a record. Returns `None` if it does not exist.
    pub fn retrieve(&mut self, entity: &str, id: &Identifier) -> CoreResult<Option<Record>> {
        self.ensure_open()?;
        if !self.context.contains(entity) {
            return Ok(None);
        }
        if let Some(hit) = self.cache_get::<Record>(entity, id) {
            return Ok(Some(hit));
        }
        let record = self.persister(entity)?.retrieve(id)?;
        if let Some(record) = &record {
            self.cache_put(entity, id, record.clone());
        }
        Ok(record)
    }

    /// Retrieves several records, aligned with `ids`.
    pub fn retrieve_all(
        &mut self,
        entity: &str,
        ids: &[Identifier],
    ) -> CoreResult<Vec<Option<Record>>> {
        ids.iter().map(|id| self.retrieve(entity, id)).collect()
    }

    /// Deletes a record. Returns whether it existed.
    pub fn delete(&mut self, entity: &str, id: &Identifier) -> CoreResult<bool> {
        self.ensure_open()?;
        if !self.context.contains(entity) {
            return Ok(false);
        }
        self.cache_evict(entity, id);
        self.persister(entity)?.delete(id)
    }

    /// Lists up to `limit` records of `entity`.
    pub fn list(&mut self, entity: &str, limit: Option<usize>) -> CoreResult<Vec<Record>> {
        self.ensure_open()?;
        if !self.context.contains(entity) {
            return Ok(Vec::new());
        }
        self.persister(entity)?.list(limit)
    }

    /// Finds records of `entity` whose `property` equals `value`.
    pub fn find_by(
        &mut self,
        entity: &str,
        property: &str,
        value: impl Into<Value>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Record>> {
        self.ensure_open()?;
        if !self.context.contains(entity) {
            return Ok(Vec::new());
        }
        self.persister(entity)?.find_by(property, value.into(), limit)
    }

    // --- typed API ---

    /// Stores a typed object, assigning its identifier on first store.
    pub fn persist<T: Entity>(&mut self, object: &mut T) -> CoreResult<Identifier> {
        let persister = self.persister_for::<T>()?;
        let table = self.context.accessors::<T>()?;
        let id = persister.persist(&mut table.access(object))?;
        self.cache_put(persister.entity().name(), &id, object.clone());
        Ok(id)
    }

    /// Loads a typed object. Returns `None` if it does not exist.
    pub fn get<T: Entity>(&mut self, id: &Identifier) -> CoreResult<Option<T>> {
        let persister = self.persister_for::<T>()?;
        let entity = persister.entity().name();
        if let Some(hit) = self.cache_get::<T>(entity, id) {
            return Ok(Some(hit));
        }

        let table = self.context.accessors::<T>()?;
        let mut object = T::default();
        if !persister.retrieve_into(id, &mut table.access(&mut object))? {
            return Ok(None);
        }
        self.cache_put(entity, id, object.clone());
        Ok(Some(object))
    }

    /// Loads several typed objects, aligned with `ids`.
    pub fn get_all<T: Entity>(&mut self, ids: &[Identifier]) -> CoreResult<Vec<Option<T>>> {
        ids.iter().map(|id| self.get::<T>(id)).collect()
    }

    /// Deletes a typed object by identifier. Returns whether it existed.
    pub fn remove<T: Entity>(&mut self, id: &Identifier) -> CoreResult<bool> {
        let persister = self.persister_for::<T>()?;
        self.cache_evict(persister.entity().name(), id);
        persister.delete(id)
    }

    /// Lists up to `limit` typed objects.
    pub fn list_all<T: Entity>(&mut self, limit: Option<usize>) -> CoreResult<Vec<T>> {
        let persister = self.persister_for::<T>()?;
        let table = self.context.accessors::<T>()?;
        persister.list_into(&table, limit)
    }

    /// Finds typed objects whose `property` equals `value`.
    pub fn find_all_by<T: Entity>(
        &mut self,
        property: &str,
        value: impl Into<Value>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<T>> {
        let persister = self.persister_for::<T>()?;
        let table = self.context.accessors::<T>()?;
        persister.find_into(&table, property, value.into(), limit)
    }

    // --- locking ---

    /// Locks a record, waiting at most `timeout` or the configured default.
    pub fn lock(
        &mut self,
        entity: &str,
        id: &Identifier,
        timeout: Option<Duration>,
    ) -> CoreResult<()> {
        let timeout = timeout.unwrap_or(self.config.lock_timeout);
        self.persister(entity)?.lock(id, timeout)
    }

    /// Releases a lock held by this session.
    pub fn unlock(&mut self, entity: &str, id: &Identifier) -> CoreResult<()> {
        self.persister(entity)?.unlock(id)
    }

    /// Whether any session holds a lock on the record.
    pub fn is_locked(&mut self, entity: &str, id: &Identifier) -> CoreResult<bool> {
        self.persister(entity)?.is_locked(id)
    }

    // --- transactions ---

    /// Begins a transaction, or joins the active one.
    ///
    /// A joined transaction is returned as a participating handle; see
    /// [`Transaction`].
    pub fn begin_transaction(&mut self) -> CoreResult<Transaction> {
        self.ensure_open()?;
        if let Some(active) = &self.transaction {
            trace!(session = %self.id, txn = %active.id(), "joining active transaction");
            return Ok(Transaction::participating(Arc::clone(active)));
        }

        let resource = self.backend.begin_transaction()?;
        self.last_txid += 1;
        let inner = Arc::new(TransactionInner::new(
            TransactionId::new(self.last_txid),
            resource,
        ));
        debug!(session = %self.id, txn = %inner.id(), "began transaction");
        self.transaction = Some(Arc::clone(&inner));
        Ok(Transaction::outer(inner))
    }

    /// The active transaction, if any.
    pub fn active_transaction(&mut self) -> Option<TransactionId> {
        self.observe_transaction();
        self.transaction.as_ref().map(|t| t.id())
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits if `f` returns `Ok`, rolls back if it returns `Err`.
    pub fn with_transaction<F, R>(&mut self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Self) -> CoreResult<R>,
    {
        let txn = self.begin_transaction()?;
        let result = match f(self) {
            Ok(value) => txn.commit().map(|()| value),
            Err(e) => {
                // Try to roll back, but don't mask the original error
                if let Err(rollback) = txn.rollback() {
                    warn!(session = %self.id, error = %rollback, "rollback after failed work also failed");
                }
                Err(e)
            }
        };
        self.observe_transaction();
        result
    }

    /// Empties the first-level cache.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Closes the session.
    ///
    /// An active transaction is rolled back and the session's locks are
    /// released. Calling this on a closed session does nothing.
    pub fn disconnect(&mut self) -> CoreResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let mut result = Ok(());
        if let Some(active) = self.transaction.take() {
            if active.is_active() {
                warn!(session = %self.id, txn = %active.id(), "closing session with active transaction, rolling back");
                result = active.rollback();
            }
        }
        self.backend.release();
        self.persisters.clear();
        self.cache.clear();
        debug!(session = %self.id, "session closed");
        result
    }
}

impl<B: EntryBackend> Drop for Session<B> {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!(session = %self.id, error = %e, "error closing session");
        }
    }
}

impl<B: EntryBackend> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("open", &self.open)
            .field("persisters", &self.persisters.len())
            .field("cached", &self.cache.len())
            .field("transaction", &self.transaction.as_ref().map(|t| t.id()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScratchBackend;
    use polystore_model::{EntityMapping, PersistentProperty, PropertyType, Registration};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Task {
        id: Option<i64>,
        title: String,
        done: bool,
    }

    impl Entity for Task {
        fn mapping() -> EntityMapping<Self> {
            EntityMapping::<Self>::new(
                "task",
                "id",
                PropertyType::I64,
                |t| t.id.map(Identifier::Long),
                |t, id| t.id = id.as_long(),
            )
            .property(
                PersistentProperty::new("title", PropertyType::String).indexed(),
                |t| Value::from(t.title.as_str()),
                |t, v| t.title = v.as_text().unwrap_or_default().to_string(),
            )
            .property(
                PersistentProperty::new("done", PropertyType::Bool),
                |t| Value::Bool(t.done),
                |t, v| t.done = v.as_bool().unwrap_or_default(),
            )
        }
    }

    fn session_with(config: DatastoreConfig) -> Session<ScratchBackend> {
        let context = Arc::new(MappingContext::new());
        context
            .add_persistent_entities(&[Registration::of::<Task>()])
            .unwrap();
        Session::new(
            SessionId::new(1),
            context,
            Arc::new(ScratchBackend::default()),
            config,
        )
    }

    fn session() -> Session<ScratchBackend> {
        session_with(DatastoreConfig::default())
    }

    fn person(first: &str, last: &str) -> Record {
        Record::new().with("firstname", first).with("lastname", last)
    }

    #[test]
    fn store_registers_schemaless_entity() {
        let mut session = session();
        assert!(session
            .retrieve("persons", &Identifier::Long(1))
            .unwrap()
            .is_none());

        let mut record = person("Guillaume", "Laforge");
        let id = session.store("persons", &mut record).unwrap();
        assert!(session.mapping_context().contains("persons"));

        session.clear();
        let loaded = session.retrieve("persons", &id).unwrap().unwrap();
        assert_eq!(loaded.get("firstname"), Some(&Value::from("Guillaume")));
    }

    #[test]
    fn persisters_are_cached() {
        let mut session = session();
        let a = session.persister("task").unwrap();
        let b = session.persister_for::<Task>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(session.persister("unknown").is_err());
    }

    #[test]
    fn typed_round_trip() {
        let mut session = session();
        let mut task = Task {
            id: None,
            title: "write docs".into(),
            done: false,
        };
        let id = session.persist(&mut task).unwrap();
        assert_eq!(task.id, id.as_long());

        session.clear();
        assert_eq!(session.get::<Task>(&id).unwrap(), Some(task.clone()));

        task.done = true;
        session.persist(&mut task).unwrap();
        session.clear();
        assert!(session.get::<Task>(&id).unwrap().unwrap().done);

        let found = session
            .find_all_by::<Task>("title", "write docs", None)
            .unwrap();
        assert_eq!(found, vec![task.clone()]);
        assert_eq!(session.list_all::<Task>(None).unwrap().len(), 1);

        assert!(session.remove::<Task>(&id).unwrap());
        assert_eq!(session.get::<Task>(&id).unwrap(), None);
        assert!(!session.remove::<Task>(&id).unwrap());
    }

    #[test]
    fn get_all_aligns_with_ids() {
        let mut session = session();
        let mut first = Task::default();
        let id = session.persist(&mut first).unwrap();
        let found = session
            .get_all::<Task>(&[Identifier::Long(404), id])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].is_none());
        assert!(found[1].is_some());
    }

    #[test]
    fn commit_makes_writes_visible() {
        let mut session = session();
        let txn = session.begin_transaction().unwrap();
        let mut record = person("Jar Jar", "Binks");
        let id = session.store("persons", &mut record).unwrap();
        txn.commit().unwrap();

        session.clear();
        assert!(session.retrieve("persons", &id).unwrap().is_some());
        assert_eq!(session.active_transaction(), None);
    }

    #[test]
    fn rollback_discards_writes_and_cache() {
        let mut session = session();
        let txn = session.begin_transaction().unwrap();
        let mut record = person("Jar Jar", "Binks");
        let id = session.store("persons", &mut record).unwrap();
        txn.rollback().unwrap();

        assert!(session.retrieve("persons", &id).unwrap().is_none());
    }

    #[test]
    fn nested_begin_participates() {
        let mut session = session();
        let outer = session.begin_transaction().unwrap();
        let nested = session.begin_transaction().unwrap();
        assert!(nested.is_participating());
        assert_eq!(nested.id(), outer.id());

        let mut record = person("a", "b");
        let id = session.store("persons", &mut record).unwrap();
        nested.rollback().unwrap();

        let err = outer.commit().unwrap_err();
        assert!(matches!(err, CoreError::TransactionAborted { .. }));
        assert!(session.retrieve("persons", &id).unwrap().is_none());
    }

    #[test]
    fn with_transaction_commits_on_ok_and_rolls_back_on_err() {
        let mut session = session();
        let id = session
            .with_transaction(|s| s.store("persons", &mut person("kept", "x")))
            .unwrap();

        let err = session
            .with_transaction(|s| {
                s.store("persons", &mut person("lost", "y"))?;
                Err::<(), _>(CoreError::invalid_operation("boom"))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        let all = session.list("persons", None).unwrap();
        assert_eq!(all.len(), 1);
        assert!(session.retrieve("persons", &id).unwrap().is_some());
    }

    #[test]
    fn failed_commit_is_surfaced() {
        let mut session = session();
        session.backend().fail_next_commit();
        let err = session
            .with_transaction(|s| s.store("persons", &mut person("x", "y")))
            .unwrap_err();
        assert!(matches!(err, CoreError::DataAccess { .. }));
        assert!(session.list("persons", None).unwrap().is_empty());
    }

    #[test]
    fn failed_rollback_keeps_work_error() {
        let mut session = session();
        session.backend().fail_next_rollback();
        let err = session
            .with_transaction(|s| {
                s.store("persons", &mut person("lost", "y"))?;
                Err::<(), _>(CoreError::invalid_operation("boom"))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert!(session.active_transaction().is_none());
        assert!(session.list("persons", None).unwrap().is_empty());
    }

    #[test]
    fn disconnect_rolls_back_and_releases() {
        let mut session = session();
        let txn = session.begin_transaction().unwrap();
        session
            .store("persons", &mut person("pending", "write"))
            .unwrap();
        let backend = Arc::clone(session.backend());

        session.disconnect().unwrap();
        assert!(backend.released());
        assert_eq!(txn.state(), TransactionState::RolledBack);
        assert!(txn.commit().is_err());

        assert!(matches!(
            session.retrieve("persons", &Identifier::Long(1)),
            Err(CoreError::SessionClosed)
        ));
        assert!(session.disconnect().is_ok());
    }

    #[test]
    fn drop_releases_backend() {
        let session = session();
        let backend = Arc::clone(session.backend());
        drop(session);
        assert!(backend.released());
    }

    #[test]
    fn cache_serves_repeated_reads() {
        let mut session = session();
        let mut record = person("cached", "one");
        let id = session.store("persons", &mut record).unwrap();
        session.backend().drop_field("persons", &id, "firstname");

        let cached = session.retrieve("persons", &id).unwrap().unwrap();
        assert_eq!(cached.get("firstname"), Some(&Value::from("cached")));

        let mut uncached = session_with(DatastoreConfig::default().cache_objects(false));
        let id = uncached
            .store("persons", &mut person("cached", "two"))
            .unwrap();
        uncached.backend().drop_field("persons", &id, "firstname");
        let fresh = uncached.retrieve("persons", &id).unwrap().unwrap();
        assert_eq!(fresh.get("firstname"), None);
    }

    #[test]
    fn delete_unknown_entity_is_noop() {
        let mut session = session();
        assert!(!session.delete("nothing", &Identifier::Long(1)).unwrap());
        assert!(session.list("nothing", Some(10)).unwrap().is_empty());
        assert!(session
            .find_by("nothing", "a", 1i64, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn lock_uses_noop_backend_support() {
        let mut session = session_with(DatastoreConfig::default().lock_timeout(Duration::ZERO));
        let mut task = Task::default();
        let id = session.persist(&mut task).unwrap();
        session.lock("task", &id, None).unwrap();
        assert!(!session.is_locked("task", &id).unwrap());
        session.unlock("task", &id).unwrap();
    }
}
