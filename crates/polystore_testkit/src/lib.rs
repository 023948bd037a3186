//! # polystore testkit
//!
//! Test utilities for polystore.
//!
//! This crate provides:
//! - Fixtures: typed `Person`/`Pet` entities, the person records of the
//!   key-value scenarios, JSON fixture sets and datastore helpers
//! - Property-based test generators using proptest
//! - Cross-crate integration test helpers
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use polystore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_session() {
//!     with_session(|session| {
//!         let id = session.store(PERSONS, &mut person_one()).unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
