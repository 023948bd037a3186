//! Cross-crate integration test helpers.
//!
//! Provides a harness that stores records through a session and keeps its
//! own copy of what was stored, so reads can be verified against it.

use crate::fixtures::TestDatastore;
use polystore_core::Session;
use polystore_memory::MapBackend;
use polystore_model::{Identifier, Record};
use std::collections::HashMap;

/// A test harness for integration testing.
pub struct IntegrationHarness {
    /// Keeps the datastore alive for the session.
    pub datastore: TestDatastore,
    /// The session records are stored through.
    pub session: Session<MapBackend>,
    entity: String,
    expected: HashMap<Identifier, Record>,
}

impl IntegrationHarness {
    /// Creates a harness storing records under `entity`.
    pub fn new(entity: &str) -> Self {
        let datastore = TestDatastore::memory();
        let session = datastore.session();
        Self {
            datastore,
            session,
            entity: entity.to_string(),
            expected: HashMap::new(),
        }
    }

    /// Stores a record and tracks it for later verification.
    pub fn store(&mut self, mut record: Record) -> Identifier {
        let id = self
            .session
            .store(&self.entity, &mut record)
            .expect("Failed to store record");
        self.expected.insert(id.clone(), record);
        id
    }

    /// Retrieves a record, bypassing the session cache, and checks it
    /// matches the tracked one.
    pub fn retrieve_and_verify(&mut self, id: &Identifier) -> Option<Record> {
        self.session.clear();
        let actual = self
            .session
            .retrieve(&self.entity, id)
            .expect("Failed to retrieve record");

        if let Some(expected) = self.expected.get(id) {
            let actual = actual.as_ref().unwrap_or_else(|| panic!("record {id} missing"));
            for (name, value) in expected.iter() {
                assert_eq!(actual.get(name), Some(value), "field {name} of {id}");
            }
        }
        actual
    }

    /// Deletes a record and updates tracking.
    pub fn delete(&mut self, id: &Identifier) -> bool {
        self.expected.remove(id);
        self.session
            .delete(&self.entity, id)
            .expect("Failed to delete record")
    }

    /// Verifies every tracked record.
    pub fn verify_all(&mut self) {
        let ids: Vec<Identifier> = self.expected.keys().cloned().collect();
        for id in ids {
            assert!(self.retrieve_and_verify(&id).is_some(), "record {id} missing");
        }
    }

    /// Number of tracked records.
    pub fn tracked(&self) -> usize {
        self.expected.len()
    }
}
