//! Secondary equality index.

use crate::store::MapEntry;
use dashmap::DashMap;
use polystore_model::Value;
use std::collections::{BTreeSet, HashMap};

type Postings = HashMap<String, BTreeSet<i64>>;

/// Maps (entity, field, value) to the keys of the entries holding it.
///
/// Only fields declared with [`create`](Self::create) are indexed. Callers
/// serialize updates for one entity; the store does so under the entity's
/// table lock.
#[derive(Debug, Default)]
pub(crate) struct PropertyIndex {
    fields: DashMap<String, Vec<String>>,
    postings: DashMap<(String, String), Postings>,
}

// Values are not hashable (floats), so postings key on the debug form,
// which keeps the variant. Keys agree with `==`: both zeroes share one and
// NaN, equal to nothing, has none.
fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::Double(x) if x.is_nan() => None,
        Value::Float(x) if x.is_nan() => None,
        Value::Double(x) if *x == 0.0 => Some("Double(0.0)".to_string()),
        Value::Float(x) if *x == 0.0 => Some("Float(0.0)".to_string()),
        other => Some(format!("{other:?}")),
    }
}

impl PropertyIndex {
    pub(crate) fn create(&self, entity: &str, field: &str) {
        let mut fields = self.fields.entry(entity.to_string()).or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
        self.postings
            .entry((entity.to_string(), field.to_string()))
            .or_default();
    }

    pub(crate) fn is_indexed(&self, entity: &str, field: &str) -> bool {
        self.postings
            .contains_key(&(entity.to_string(), field.to_string()))
    }

    /// Moves `key` from the postings of `old` to those of `new`.
    pub(crate) fn reindex(
        &self,
        entity: &str,
        key: i64,
        old: Option<&MapEntry>,
        new: Option<&MapEntry>,
    ) {
        let Some(fields) = self.fields.get(entity) else {
            return;
        };
        for field in fields.iter() {
            let before = old.and_then(|e| e.get(field));
            let after = new.and_then(|e| e.get(field));
            if before == after {
                continue;
            }
            let Some(mut postings) = self
                .postings
                .get_mut(&(entity.to_string(), field.clone()))
            else {
                continue;
            };
            if let Some(vk) = before.and_then(value_key) {
                if let Some(keys) = postings.get_mut(&vk) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        postings.remove(&vk);
                    }
                }
            }
            if let Some(vk) = after.and_then(value_key) {
                postings.entry(vk).or_default().insert(key);
            }
        }
    }

    /// Keys whose `field` equals `value`, in key order. `None` when the
    /// field is not indexed.
    pub(crate) fn lookup(&self, entity: &str, field: &str, value: &Value) -> Option<Vec<i64>> {
        let postings = self
            .postings
            .get(&(entity.to_string(), field.to_string()))?;
        Some(
            value_key(value)
                .and_then(|vk| postings.get(&vk))
                .map(|keys| keys.iter().copied().collect())
                .unwrap_or_default(),
        )
    }

    pub(crate) fn clear(&self) {
        self.fields.clear();
        self.postings.clear();
    }
}
