//! Diff engine for Vellum.
//!
//! Computes what changed on one row between two consecutive store versions,
//! producing the set of changed dotted key paths (descending through links
//! and link lists) and the per-property change list that observers receive.
//!
//! # Key Types
//!
//! - [`KeyPath`] / [`KeyPathFilter`] -- dotted property paths and observer filters
//! - [`RowDiffer`] -- diffs a row between two versions of an [`ObjectStore`](vellum_store::ObjectStore)
//! - [`ObjectDiff`] / [`PropertyChange`] -- the diff result

pub mod error;
pub mod key_path;
pub mod row_diff;

pub use error::{DiffError, DiffResult};
pub use key_path::{validate_key_path, KeyPath, KeyPathFilter};
pub use row_diff::{ObjectDiff, PropertyChange, RowChanges, RowDiffer, SchemaLookup};
