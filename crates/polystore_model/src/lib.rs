//! # polystore model
//!
//! The persistent entity model shared by every polystore backend.
//!
//! This crate provides:
//! - [`PersistentEntity`] and [`PersistentProperty`] descriptions, built once
//!   and immutable afterwards
//! - [`MappingContext`], the registry entities are looked up in
//! - [`Value`], [`Identifier`] and [`Record`], the dynamic data model
//! - [`ValueKind`], the total coercion applied at the storage boundary
//! - [`EntityAccess`] and the [`Entity`] trait with its accessor tables
//!
//! ## Usage
//!
//! ```
//! use polystore_model::{MappingContext, PersistentEntity, PersistentProperty, PropertyType};
//!
//! let ctx = MappingContext::new();
//! let entity = PersistentEntity::builder("person")
//!     .identity("id", PropertyType::I64)
//!     .property(PersistentProperty::new("firstName", PropertyType::String))
//!     .build()
//!     .unwrap();
//! ctx.add_entity(entity);
//!
//! let person = ctx.persistent_entity("person").unwrap();
//! let first = person.property("firstName").unwrap();
//! assert_eq!(first.capitalized_name(), "FirstName");
//! assert_eq!(first.owner(), "person");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod context;
mod entity;
mod error;
mod identifier;
mod kind;
mod property;
mod record;
mod value;

pub use access::{AccessorTable, Entity, EntityAccess, EntityMapping, Getter, Setter, TypedAccess};
pub use context::{MappingContext, Registration};
pub use entity::{EntityBuilder, PersistentEntity, SCHEMALESS_IDENTITY};
pub use error::{MappingError, MappingResult};
pub use identifier::Identifier;
pub use kind::ValueKind;
pub use property::{capitalize, PersistentProperty, PropertyMapping, PropertyType};
pub use record::Record;
pub use value::Value;
