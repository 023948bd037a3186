//! The datastore abstraction.

use crate::backend::EntryBackend;
use crate::config::{DatastoreConfig, Properties};
use crate::error::CoreResult;
use crate::session::Session;
use polystore_model::MappingContext;
use std::sync::Arc;

/// A factory for sessions over one kind of backend.
///
/// A datastore owns the mapping context and the configuration shared by all
/// of its sessions. It is safe to share across threads; the sessions it
/// creates are not meant to be.
pub trait Datastore: Send + Sync {
    /// Backend type sessions are bound to.
    type Backend: EntryBackend;

    /// The mapping context entities are registered in.
    fn mapping_context(&self) -> &Arc<MappingContext>;

    /// Configuration sessions start from.
    fn config(&self) -> &DatastoreConfig;

    /// Opens a session.
    ///
    /// `properties` override the datastore configuration for this session
    /// only. Selecting an unknown connection source is a configuration error.
    fn connect(&self, properties: Option<&Properties>) -> CoreResult<Session<Self::Backend>>;
}
