//! Schema descriptors for Vellum object classes.
//!
//! A [`SchemaDescriptor`] is the static, per-class table of
//! [`PropertyDescriptor`]s that every accessor dispatches through. It is
//! built once per class, validated at build time, and shared by every
//! object of that class through an `Arc`.
//!
//! # Design Rules
//!
//! 1. Property order is declaration order and is stable across rebuilds.
//! 2. At most one property is the primary key, and its type must be an
//!    integer, string or object id.
//! 3. Ignored properties are remembered by name but are never persisted and
//!    never appear in the property sequence.
//! 4. Only indexable types may carry an index.
//! 5. Lookup by name is exact and case-sensitive; absence is not an error.

pub mod error;
pub mod property;
pub mod registry;
pub mod schema;
pub mod set;

pub use error::{SchemaError, SchemaResult};
pub use property::{DefaultValue, PropertyDescriptor};
pub use registry::{class_schema, register_class, schema_of, ObjectType};
pub use schema::{SchemaBuilder, SchemaDescriptor};
pub use set::SchemaSet;
