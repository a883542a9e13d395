//! Error types for the diff crate.

use vellum_types::TableId;

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiffError {
    /// A row belongs to a table no schema is known for.
    #[error("no schema for table {0}")]
    UnknownTable(TableId),

    /// A relationship targets a class no schema is known for.
    #[error("no schema for class '{0}'")]
    UnknownClass(String),

    /// A key path does not resolve against the observed class.
    #[error("invalid key path '{path}': {reason}")]
    InvalidKeyPath { path: String, reason: String },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] vellum_store::StoreError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
