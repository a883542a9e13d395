use std::fmt;

use serde::{Deserialize, Serialize};

/// A committed store version.
///
/// Versions start at zero (the empty store) and increase by one with every
/// committed write transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    /// The version of an empty store.
    pub const ZERO: Version = Version(0);

    /// The version a commit on top of this one produces.
    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }

    /// The version this one was committed on top of, if any.
    pub fn previous(self) -> Option<Version> {
        self.0.checked_sub(1).map(Version)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Identifier of a table (one per object class) inside a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Identifier of a row inside its table. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Address of one storage slot.
///
/// A `RowRef` identifies a logical record across versions; whether the row
/// exists is a question asked of a particular version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowRef {
    pub table: TableId,
    pub row: RowId,
}

impl RowRef {
    pub fn new(table: TableId, row: RowId) -> Self {
        Self { table, row }
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.row)
    }
}
