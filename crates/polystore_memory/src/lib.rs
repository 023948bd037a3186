//! # polystore memory
//!
//! In-memory reference backend for polystore.
//!
//! This crate provides:
//! - [`MapStore`], a datastore-scoped record store: one table per entity,
//!   a secondary equality index, key sequences and a lock table
//! - [`MapBackend`], the [`EntryBackend`](polystore_core::EntryBackend)
//!   bound to one session, with buffered transactions
//! - [`MemoryDatastore`], which owns one store per connection source
//!
//! ## Transactions
//!
//! Writes made inside a transaction are buffered per session and overlaid
//! on that session's reads. Commit applies the buffer to the store; rollback
//! discards it. Other sessions only ever see committed records.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod buffer;
mod datastore;
mod index;
mod locks;
mod store;

pub use backend::MapBackend;
pub use datastore::MemoryDatastore;
pub use locks::LockTable;
pub use store::{MapEntry, MapStore};
