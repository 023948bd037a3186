//! Record identifiers.

use crate::error::MappingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a stored record.
///
/// Identifiers are assigned once, on first store, and stay stable for the
/// lifetime of the record. Backends keep their own native key type and
/// convert at the persister boundary, so callers only ever see this enum.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Identifier {
    /// A generated 64-bit key.
    Long(i64),
    /// An opaque string key.
    Text(String),
    /// A UUID key.
    Uuid(Uuid),
}

impl Identifier {
    /// Creates a new random UUID identifier.
    #[must_use]
    pub fn random() -> Self {
        Self::Uuid(Uuid::new_v4())
    }

    /// Returns the long value, if this is a long identifier.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string value, if this is a text identifier.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<i64> for Identifier {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Uuid> for Identifier {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

impl TryFrom<Identifier> for i64 {
    type Error = MappingError;

    fn try_from(id: Identifier) -> Result<Self, Self::Error> {
        match id {
            Identifier::Long(n) => Ok(n),
            Identifier::Text(ref s) => s
                .parse()
                .map_err(|_| MappingError::identifier_type("long", id.to_string())),
            Identifier::Uuid(_) => Err(MappingError::identifier_type("long", id.to_string())),
        }
    }
}

impl TryFrom<Identifier> for String {
    type Error = MappingError;

    fn try_from(id: Identifier) -> Result<Self, Self::Error> {
        Ok(match id {
            Identifier::Text(s) => s,
            other => other.to_string(),
        })
    }
}

impl TryFrom<Identifier> for Uuid {
    type Error = MappingError;

    fn try_from(id: Identifier) -> Result<Self, Self::Error> {
        match id {
            Identifier::Uuid(u) => Ok(u),
            Identifier::Text(ref s) => {
                Uuid::parse_str(s).map_err(|_| MappingError::identifier_type("uuid", s.clone()))
            }
            Identifier::Long(n) => Err(MappingError::identifier_type("uuid", n.to_string())),
        }
    }
}
