use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_id::ObjectId;
use crate::value::Value;

/// Hashable projection of a primary-key value.
///
/// All integer widths collapse to `Int`, so a key written as `Int8(3)`
/// and one written as `Int64(3)` compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimaryKey {
    Null,
    Int(i64),
    String(String),
    ObjectId(ObjectId),
}

impl PrimaryKey {
    /// Project a stored value. Returns `None` for variants that cannot be
    /// primary keys.
    pub fn from_value(value: &Value) -> Option<PrimaryKey> {
        match value {
            Value::Null => Some(PrimaryKey::Null),
            Value::String(s) => Some(PrimaryKey::String(s.clone())),
            Value::ObjectId(id) => Some(PrimaryKey::ObjectId(*id)),
            other => other.as_i64().map(PrimaryKey::Int),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Null => f.write_str("null"),
            PrimaryKey::Int(i) => write!(f, "{i}"),
            PrimaryKey::String(s) => write!(f, "'{s}'"),
            PrimaryKey::ObjectId(id) => write!(f, "{id}"),
        }
    }
}
