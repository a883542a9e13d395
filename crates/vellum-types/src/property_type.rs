use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tag of a property descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    Binary,
    Date,
    Decimal128,
    ObjectId,
    /// To-one relationship to an object of another (or the same) class.
    Link,
    /// Ordered, persisted collection of scalars or links.
    List,
    /// Computed inverse of a link or list property on another class.
    LinkingObjects,
}

impl PropertyType {
    /// Returns `true` for the fixed-width integer tags.
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Returns `true` for tags whose values are stored inline in a row.
    pub fn is_scalar(self) -> bool {
        !matches!(self, Self::Link | Self::List | Self::LinkingObjects)
    }

    /// Whether a property of this type may carry a secondary index.
    pub fn is_indexable(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::String
                | Self::Date
                | Self::ObjectId
        )
    }

    /// Whether a property of this type may be declared the primary key.
    pub fn is_valid_primary_key(self) -> bool {
        self.is_integer() || matches!(self, Self::String | Self::ObjectId)
    }

    /// Lowercase name used in descriptions and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Binary => "data",
            Self::Date => "date",
            Self::Decimal128 => "decimal128",
            Self::ObjectId => "object id",
            Self::Link => "object",
            Self::List => "array",
            Self::LinkingObjects => "linking objects",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
