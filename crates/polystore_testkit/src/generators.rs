//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records and values that every
//! backend stores natively.

use crate::fixtures::Person;
use chrono::{DateTime, Utc};
use polystore_model::{Identifier, Record, Value};
use proptest::prelude::*;

/// Strategy for field names of schemaless records.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for timestamps with millisecond precision.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800_000).prop_filter_map("timestamp out of range", |millis| {
        DateTime::<Utc>::from_timestamp_millis(millis)
    })
}

/// Strategy for values in the natively stored subset: text, booleans,
/// longs, finite doubles and timestamps.
pub fn native_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        ".{0,32}".prop_map(Value::Text),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Long),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Value::Double),
        timestamp_strategy().prop_map(Value::Timestamp),
    ]
}

/// Strategy for schemaless records with native values.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    prop::collection::btree_map(field_name_strategy(), native_value_strategy(), 0..8)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for unsaved typed people.
pub fn person_strategy() -> impl Strategy<Value = Person> {
    ("[A-Z][a-z]{0,11}", "[A-Z][a-z]{0,11}", 0i32..120)
        .prop_map(|(first, last, age)| Person::new(&first, &last, age))
}

/// Strategy for identifiers of every variant.
pub fn identifier_strategy() -> impl Strategy<Value = Identifier> {
    prop_oneof![
        any::<i64>().prop_map(Identifier::Long),
        "[a-z0-9-]{1,24}".prop_map(Identifier::Text),
        any::<u128>().prop_map(|n| Identifier::Uuid(uuid::Uuid::from_u128(n))),
    ]
}
