//! Lossless scalar coercion.
//!
//! Values arriving through dynamic or typed accessors are normalized to the
//! descriptor's type before they are stored. A conversion either preserves
//! the value exactly or fails with [`TypeError::Lossy`]; incompatible
//! variants fail with [`TypeError::Mismatch`].

use rust_decimal::Decimal;

use crate::error::TypeError;
use crate::property_type::PropertyType;
use crate::value::Value;

/// Largest integer magnitude an `f32` represents exactly.
const F32_EXACT: u64 = 1 << 24;
/// Largest integer magnitude an `f64` represents exactly.
const F64_EXACT: u64 = 1 << 53;

/// Coerce `value` into the stored form of a scalar property of type `ty`.
pub fn coerce(value: Value, ty: PropertyType, optional: bool) -> Result<Value, TypeError> {
    if !ty.is_scalar() {
        return Err(TypeError::NotScalar(ty));
    }
    if value.is_null() {
        return if optional {
            Ok(Value::Null)
        } else {
            Err(TypeError::NullNotAllowed(ty))
        };
    }

    let mismatch = |v: &Value| TypeError::Mismatch {
        expected: ty,
        found: v.kind(),
    };
    let lossy = |v: &Value| TypeError::Lossy {
        value: v.to_string(),
        target: ty,
    };

    match ty {
        PropertyType::Bool => match value {
            Value::Bool(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        PropertyType::Int8 | PropertyType::Int16 | PropertyType::Int32 | PropertyType::Int64 => {
            let wide = integral(&value).ok_or_else(|| match value.as_f64() {
                Some(_) => lossy(&value),
                None => mismatch(&value),
            })?;
            narrow(wide, ty).ok_or_else(|| lossy(&value))
        }
        PropertyType::Float => match value {
            Value::Float(_) => Ok(value),
            Value::Double(d) => {
                let f = d as f32;
                if f64::from(f) == d || d.is_nan() {
                    Ok(Value::Float(f))
                } else {
                    Err(lossy(&value))
                }
            }
            ref v => match v.as_i64() {
                Some(i) if i.unsigned_abs() <= F32_EXACT => Ok(Value::Float(i as f32)),
                Some(_) => Err(lossy(v)),
                None => Err(mismatch(v)),
            },
        },
        PropertyType::Double => match value {
            Value::Double(_) => Ok(value),
            Value::Float(f) => Ok(Value::Double(f64::from(f))),
            ref v => match v.as_i64() {
                Some(i) if i.unsigned_abs() <= F64_EXACT => Ok(Value::Double(i as f64)),
                Some(_) => Err(lossy(v)),
                None => Err(mismatch(v)),
            },
        },
        PropertyType::String => match value {
            Value::String(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        PropertyType::Binary => match value {
            Value::Binary(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        PropertyType::Date => match value {
            Value::Date(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        PropertyType::Decimal128 => match value {
            Value::Decimal128(_) => Ok(value),
            ref v => match v.as_i64() {
                Some(i) => Ok(Value::Decimal128(Decimal::from(i))),
                None => Err(mismatch(v)),
            },
        },
        PropertyType::ObjectId => match value {
            Value::ObjectId(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        PropertyType::Link | PropertyType::List | PropertyType::LinkingObjects => {
            Err(TypeError::NotScalar(ty))
        }
    }
}

/// Integer content of a value: integer variants, or floating-point values
/// that hold an exact integer.
fn integral(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let d = value.as_f64()?;
    if d.is_finite() && d.fract() == 0.0 && d.abs() <= F64_EXACT as f64 {
        Some(d as i64)
    } else {
        None
    }
}

fn narrow(i: i64, ty: PropertyType) -> Option<Value> {
    match ty {
        PropertyType::Int8 => i8::try_from(i).ok().map(Value::Int8),
        PropertyType::Int16 => i16::try_from(i).ok().map(Value::Int16),
        PropertyType::Int32 => i32::try_from(i).ok().map(Value::Int32),
        PropertyType::Int64 => Some(Value::Int64(i)),
        _ => None,
    }
}
