//! The in-memory datastore.

use crate::backend::MapBackend;
use crate::store::MapStore;
use polystore_core::{
    ConnectionSources, CoreResult, Datastore, DatastoreConfig, Properties, Session, SessionId,
};
use polystore_model::{MappingContext, Registration};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A datastore keeping records in memory.
///
/// Each connection source owns an independent [`MapStore`]. Sessions bound
/// to the same source share its records, index and lock table.
///
/// # Example
///
/// ```
/// use polystore_core::{Datastore, DatastoreConfig};
/// use polystore_memory::MemoryDatastore;
/// use polystore_model::{Identifier, Record};
///
/// let datastore = MemoryDatastore::new(DatastoreConfig::default(), &[]).unwrap();
/// let mut session = datastore.connect(None).unwrap();
///
/// let mut person = Record::new().with("firstname", "Guillaume");
/// let id = session.store("persons", &mut person).unwrap();
/// assert!(session.retrieve("persons", &id).unwrap().is_some());
/// assert!(session.retrieve("persons", &Identifier::Long(99)).unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct MemoryDatastore {
    context: Arc<MappingContext>,
    config: DatastoreConfig,
    sources: ConnectionSources<Arc<MapStore>>,
    next_session: AtomicU64,
}

impl MemoryDatastore {
    /// Creates a datastore with the given entities registered.
    pub fn new(config: DatastoreConfig, entities: &[Registration]) -> CoreResult<Self> {
        Self::with_properties(config, entities, &Properties::new())
    }

    /// Creates a datastore configured from `properties`.
    ///
    /// Properties override `config`; `datastore.connections` declares the
    /// extra connection sources. The selected connection source must exist.
    pub fn with_properties(
        config: DatastoreConfig,
        entities: &[Registration],
        properties: &Properties,
    ) -> CoreResult<Self> {
        let config = config.merge_properties(properties)?;
        let context = Arc::new(MappingContext::new());
        context.add_persistent_entities(entities)?;

        let sources = ConnectionSources::from_properties(properties, |settings| {
            debug!(source = settings.name(), "creating map store");
            Ok(Arc::new(MapStore::new()))
        })?;
        sources.get(&config.connection_source)?;

        Ok(Self {
            context,
            config,
            sources,
            next_session: AtomicU64::new(0),
        })
    }

    /// Opens a session with the datastore's own configuration.
    pub fn create_session(&self) -> CoreResult<Session<MapBackend>> {
        self.connect(None)
    }

    /// The store behind a connection source.
    pub fn backing_store(&self, source: &str) -> CoreResult<&Arc<MapStore>> {
        Ok(self.sources.get(source)?.source())
    }

    /// The configured connection sources.
    #[must_use]
    pub fn connection_sources(&self) -> &ConnectionSources<Arc<MapStore>> {
        &self.sources
    }

    /// Drops every record of every connection source.
    ///
    /// Meant for test isolation.
    pub fn clear_data(&self) {
        for source in self.sources.iter() {
            source.source().clear();
        }
    }
}

impl Datastore for MemoryDatastore {
    type Backend = MapBackend;

    fn mapping_context(&self) -> &Arc<MappingContext> {
        &self.context
    }

    fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    fn connect(&self, properties: Option<&Properties>) -> CoreResult<Session<MapBackend>> {
        let config = match properties {
            Some(properties) => self.config.merge_properties(properties)?,
            None => self.config.clone(),
        };
        let store = Arc::clone(self.sources.get(&config.connection_source)?.source());
        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::SeqCst) + 1);
        Ok(Session::new(
            id,
            Arc::clone(&self.context),
            Arc::new(MapBackend::new(store, id)),
            config,
        ))
    }
}
