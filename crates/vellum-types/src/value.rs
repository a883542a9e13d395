use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::RowRef;
use crate::object_id::ObjectId;
use crate::property_type::PropertyType;

/// A tagged property value.
///
/// `Int` is an untyped integer literal: it is accepted on input and coerced
/// to the descriptor's fixed-width type, so it never reaches storage. Every
/// other variant is stored exactly as written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Date(DateTime<Utc>),
    Decimal128(Decimal),
    ObjectId(ObjectId),
    Link(RowRef),
    List(Vec<Value>),
}

impl Value {
    /// The value a freshly created object holds for a property of this type
    /// when no default is declared.
    pub fn initial_for(ty: PropertyType, optional: bool) -> Value {
        if optional && ty.is_scalar() {
            return Value::Null;
        }
        match ty {
            PropertyType::Bool => Value::Bool(false),
            PropertyType::Int8 => Value::Int8(0),
            PropertyType::Int16 => Value::Int16(0),
            PropertyType::Int32 => Value::Int32(0),
            PropertyType::Int64 => Value::Int64(0),
            PropertyType::Float => Value::Float(0.0),
            PropertyType::Double => Value::Double(0.0),
            PropertyType::String => Value::String(String::new()),
            PropertyType::Binary => Value::Binary(Vec::new()),
            PropertyType::Date => Value::Date(epoch()),
            PropertyType::Decimal128 => Value::Decimal128(Decimal::ZERO),
            PropertyType::ObjectId => Value::ObjectId(ObjectId::generate()),
            PropertyType::Link | PropertyType::LinkingObjects => Value::Null,
            PropertyType::List => Value::List(Vec::new()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in type errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Binary(_) => "data",
            Value::Date(_) => "date",
            Value::Decimal128(_) => "decimal128",
            Value::ObjectId(_) => "object id",
            Value::Link(_) => "object",
            Value::List(_) => "array",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) | Value::Int64(i) => Some(*i),
            Value::Int8(i) => Some(i64::from(*i)),
            Value::Int16(i) => Some(i64::from(*i)),
            Value::Int32(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<RowRef> {
        match self {
            Value::Link(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// `None` for `Null`, the value otherwise.
    pub fn into_option(self) -> Option<Value> {
        match self {
            Value::Null => None,
            other => Some(other),
        }
    }
}

/// The Unix epoch, the initial value of non-optional date properties.
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

/// Renders scalars the way object descriptions print them.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("(null)"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) | Value::Int64(i) => write!(f, "{i}"),
            Value::Int8(i) => write!(f, "{i}"),
            Value::Int16(i) => write!(f, "{i}"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::Binary(bytes) => write!(f, "<{}>", hex::encode(bytes)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S +0000")),
            Value::Decimal128(d) => write!(f, "{d}"),
            Value::ObjectId(id) => write!(f, "{id}"),
            Value::Link(r) => write!(f, "<{r}>"),
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

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<u8> => Binary,
    DateTime<Utc> => Date,
    Decimal => Decimal128,
    ObjectId => ObjectId,
    RowRef => Link,
    Vec<Value> => List,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Binary(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
