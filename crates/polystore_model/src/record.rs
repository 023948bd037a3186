//! Schemaless records.

use crate::access::EntityAccess;
use crate::identifier::Identifier;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A map of property names to values plus an optional identifier.
///
/// Records are what key-value sessions store directly, and what the
/// persister produces when it resolves a reference eagerly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    identifier: Option<Identifier>,
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identifier, builder style.
    #[must_use]
    pub fn with_identifier(mut self, id: Identifier) -> Self {
        self.identifier = Some(id);
        self
    }

    /// Adds a value, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Returns the identifier, if assigned.
    #[must_use]
    pub fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    /// Returns the value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    /// Removes a value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Returns true if a value (possibly null) is present under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the record holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            identifier: None,
            values: iter.into_iter().collect(),
        }
    }
}

impl EntityAccess for Record {
    fn identifier(&self) -> Option<Identifier> {
        self.identifier.clone()
    }

    fn set_identifier(&mut self, id: Identifier) {
        self.identifier = Some(id);
    }

    fn property_value(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Null)
    }

    fn set_property_value(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    fn property_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}
