//! # polystore core
//!
//! The datastore-independent persistence engine.
//!
//! This crate provides:
//! - [`EntryBackend`], the narrow set of primitives a storage engine supplies
//! - [`EntityPersister`], which maps objects to backend entries and back,
//!   assigns identifiers, checks versions and resolves references
//! - [`Session`], a unit of work with a persister cache, a first-level object
//!   cache and transaction participation
//! - [`Transaction`] handles with rollback-only propagation
//! - [`DatastoreConfig`] and [`ConnectionSources`] for configuration
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  Datastore   │  owns MappingContext + config, opens sessions
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │   Session    │  persisters, cache, active transaction
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │  Persister   │  one per entity, generic over the backend
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │ EntryBackend │  entries, keys, locks, transaction resources
//! └──────────────┘
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod connections;
mod datastore;
mod error;
mod persister;
mod session;
mod transaction;
mod types;

#[cfg(test)]
mod testing;

pub use backend::{EntryBackend, EntryValue, NativeKey, NoopTransactionResource, TransactionResource};
pub use config::{
    DatastoreConfig, Properties, CONNECTIONS_KEY, CONNECTION_KEY, LOCK_TIMEOUT_KEY,
    SESSION_CACHE_KEY,
};
pub use connections::{
    ConnectionSource, ConnectionSourceSettings, ConnectionSources, DEFAULT_CONNECTION_SOURCE,
};
pub use datastore::Datastore;
pub use error::{BoxError, CoreError, CoreResult};
pub use persister::EntityPersister;
pub use session::Session;
pub use transaction::{Transaction, TransactionState};
pub use types::{SessionId, TransactionId};
