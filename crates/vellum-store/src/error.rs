use vellum_types::{RowRef, TableId, Version};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// The table id was never registered.
    #[error("unknown table: {0}")]
    UnknownTable(TableId),

    /// The row does not exist at the requested version.
    #[error("row {row} does not exist at {version}")]
    RowNotFound { row: RowRef, version: Version },

    /// The requested version has not been committed yet.
    #[error("version {requested} is not available (latest is {latest})")]
    VersionNotAvailable { requested: Version, latest: Version },

    /// A batch was committed against a base that is no longer the latest.
    #[error("write batch based on {base} is stale (latest is {latest})")]
    StaleBatch { base: Version, latest: Version },

    /// A savepoint index that does not exist in this batch.
    #[error("invalid savepoint {0}")]
    InvalidSavepoint(usize),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
