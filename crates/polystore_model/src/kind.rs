//! Storage-boundary coercion.
//!
//! Every property is assigned a [`ValueKind`] once, when its mapping is
//! built. Coercion in both directions is a total function: a value that
//! does not fit its kind is stored in its string form instead of failing.

use crate::property::PropertyType;
use crate::value::Value;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// The native representation a property is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Stored as text.
    Text,
    /// Stored as a boolean.
    Boolean,
    /// Stored as a UTC timestamp.
    Timestamp,
    /// Stored as a double.
    Double,
    /// Stored as a 64-bit integer. All integral types widen to this.
    Long,
    /// Stored as a binary payload.
    Binary,
    /// Stored as the identifier of another record.
    Reference,
    /// Not natively supported; stored in its string form.
    Other,
}

impl ValueKind {
    /// Resolves the kind for a declared property type.
    #[must_use]
    pub fn for_type(ty: &PropertyType) -> Self {
        match ty {
            PropertyType::String => Self::Text,
            PropertyType::Bool => Self::Boolean,
            PropertyType::I8
            | PropertyType::I16
            | PropertyType::I32
            | PropertyType::I64
            | PropertyType::U8
            | PropertyType::U16
            | PropertyType::U32 => Self::Long,
            PropertyType::F32 | PropertyType::F64 => Self::Double,
            PropertyType::Timestamp => Self::Timestamp,
            PropertyType::Bytes => Self::Binary,
            PropertyType::Reference(_) => Self::Reference,
            PropertyType::Date | PropertyType::Uuid | PropertyType::Custom(_) => Self::Other,
        }
    }

    /// Resolves the kind from a runtime value, for schemaless records.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Text(_) | Value::Null => Self::Text,
            Value::Bool(_) => Self::Boolean,
            Value::Int(_) | Value::Long(_) => Self::Long,
            Value::Float(_) | Value::Double(_) => Self::Double,
            Value::Timestamp(_) => Self::Timestamp,
            Value::Binary(_) => Self::Binary,
            Value::Ref(_) | Value::Entity(_) => Self::Reference,
            Value::Date(_) | Value::Uuid(_) | Value::List(_) => Self::Other,
        }
    }

    /// Converts a domain value into its stored form.
    #[must_use]
    pub fn to_native(self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Text, Value::Text(s)) => Value::Text(s),
            (Self::Boolean, Value::Bool(b)) => Value::Bool(b),
            (Self::Long, Value::Int(n)) => Value::Long(i64::from(n)),
            (Self::Long, Value::Long(n)) => Value::Long(n),
            (Self::Double, Value::Float(x)) => Value::Double(f64::from(x)),
            (Self::Double, Value::Double(x)) => Value::Double(x),
            (Self::Timestamp, Value::Timestamp(t)) => Value::Timestamp(t),
            (Self::Binary, Value::Binary(b)) => Value::Binary(b),
            (Self::Reference, Value::Ref(id)) => Value::Ref(id),
            (Self::Reference, Value::Entity(record)) => record
                .identifier()
                .cloned()
                .map_or(Value::Null, Value::Ref),
            (_, other) => Value::Text(other.to_string()),
        }
    }

    /// Converts a stored value back into the domain form for this kind.
    #[must_use]
    pub fn from_native(self, stored: Value) -> Value {
        match (self, stored) {
            (_, Value::Null) => Value::Null,
            (Self::Boolean, Value::Text(s)) => match s.parse::<bool>() {
                Ok(b) => Value::Bool(b),
                Err(_) => Value::Text(s),
            },
            (Self::Long, Value::Text(s)) => match s.parse::<i64>() {
                Ok(n) => Value::Long(n),
                Err(_) => Value::Text(s),
            },
            (Self::Double, Value::Long(n)) => Value::Double(n as f64),
            (Self::Double, Value::Text(s)) => match s.parse::<f64>() {
                Ok(x) => Value::Double(x),
                Err(_) => Value::Text(s),
            },
            (Self::Timestamp, Value::Text(s)) => match DateTime::parse_from_rfc3339(&s) {
                Ok(t) => Value::Timestamp(t.with_timezone(&Utc)),
                Err(_) => Value::Text(s),
            },
            (Self::Timestamp, Value::Long(millis)) => DateTime::<Utc>::from_timestamp_millis(millis)
                .map_or(Value::Long(millis), Value::Timestamp),
            (Self::Binary, Value::Text(s)) => Value::Binary(Bytes::from(s)),
            (Self::Text | Self::Other, Value::Text(s)) => Value::Text(s),
            (Self::Text | Self::Other, other) => Value::Text(other.to_string()),
            (_, stored) => stored,
        }
    }
}
