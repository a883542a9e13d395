//! Foundation types for Vellum.
//!
//! This crate provides the value model shared by every other Vellum crate:
//! the tagged [`Value`] variant that stands in for dynamically typed
//! property values, the [`PropertyType`] tag carried by schema descriptors,
//! and the identifiers used to address rows at a given store version.
//!
//! # Key Types
//!
//! - [`Value`] -- tagged property value, normalized to its descriptor's type once stored
//! - [`PropertyType`] -- type tag of a property descriptor
//! - [`ObjectId`] -- 12-byte generated identifier usable as a primary key
//! - [`Version`] -- monotonically increasing store version
//! - [`RowRef`] -- address of one storage slot (table plus row)
//! - [`PrimaryKey`] -- hashable projection of a primary-key value
//!
//! Numeric coercion lives in [`coerce`]: a value either converts to the
//! target type without loss or the conversion fails.

pub mod coerce;
pub mod error;
pub mod ids;
pub mod object_id;
pub mod primary_key;
pub mod property_type;
pub mod value;

pub use coerce::coerce;
pub use error::TypeError;
pub use ids::{RowId, RowRef, TableId, Version};
pub use object_id::ObjectId;
pub use primary_key::PrimaryKey;
pub use property_type::PropertyType;
pub use value::Value;

pub use chrono::{DateTime, Utc};
pub use rust_decimal::Decimal;
