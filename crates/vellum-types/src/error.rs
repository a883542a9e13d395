use thiserror::Error;

use crate::property_type::PropertyType;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The value's variant cannot represent the target type at all.
    #[error("cannot store a {found} value in a {expected} property")]
    Mismatch {
        expected: PropertyType,
        found: &'static str,
    },

    /// The conversion exists but would lose information for this value.
    #[error("value {value} does not fit in a {target} property without loss")]
    Lossy { value: String, target: PropertyType },

    #[error("null is not allowed for a non-optional {0} property")]
    NullNotAllowed(PropertyType),

    /// Links, lists and linking objects are not coerced as scalars.
    #[error("{0} is not a scalar type")]
    NotScalar(PropertyType),
}
