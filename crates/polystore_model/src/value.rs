//! Dynamic property values.

use crate::identifier::Identifier;
use crate::record::Record;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A property value read from or written to a domain object.
///
/// Backends only ever store the native subset (`Null`, `Text`, `Bool`,
/// `Long`, `Double`, `Timestamp`, `Binary`, `Ref`); the wider variants exist
/// on the domain side and are narrowed by [`crate::ValueKind`] on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// UTF-8 text.
    Text(String),
    /// Boolean value.
    Bool(bool),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Calendar date without time.
    Date(NaiveDate),
    /// Binary payload.
    Binary(Bytes),
    /// UUID value.
    Uuid(Uuid),
    /// Reference to another record by identifier.
    Ref(Identifier),
    /// A resolved reference: the target record itself.
    Entity(Box<Record>),
    /// Ordered list of values.
    List(Vec<Value>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a 64-bit integer, widening `Int`.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(i64::from(*n)),
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a double, widening `Float`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as a timestamp, if it is one.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Get this value as binary, if it is binary.
    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get the identifier this value points at.
    ///
    /// Works for both unresolved (`Ref`) and resolved (`Entity`) references.
    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            Value::Ref(id) => Some(id),
            Value::Entity(record) => record.identifier(),
            _ => None,
        }
    }

    /// Get the resolved record, if this is a resolved reference.
    pub fn as_entity(&self) -> Option<&Record> {
        match self {
            Value::Entity(record) => Some(record),
            _ => None,
        }
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
            Value::Binary(_) => "binary",
            Value::Uuid(_) => "uuid",
            Value::Ref(_) => "ref",
            Value::Entity(_) => "entity",
            Value::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Double(x) => write!(f, "{x}"),
            Value::Timestamp(t) => f.write_str(&t.to_rfc3339()),
            Value::Date(d) => write!(f, "{d}"),
            Value::Binary(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Ref(id) => write!(f, "{id}"),
            Value::Entity(record) => match record.identifier() {
                Some(id) => write!(f, "{id}"),
                None => f.write_str("null"),
            },
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Double(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(b))
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<Identifier> for Value {
    fn from(id: Identifier) -> Self {
        Value::Ref(id)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Entity(Box::new(record))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
