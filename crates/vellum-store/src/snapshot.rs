use std::fmt;
use std::sync::Arc;

use vellum_types::{RowRef, TableId, Value, Version};

use crate::error::StoreResult;
use crate::traits::{ObjectStore, RowState};

/// Read-only view of a store pinned to one committed version.
///
/// Cloning is cheap; every clone reads the same version.
#[derive(Clone)]
pub struct Snapshot {
    store: Arc<dyn ObjectStore>,
    version: Version,
}

impl Snapshot {
    /// Pin `store` at `version`. Callers are expected to have checked that
    /// the version is committed; see [`ObjectStore::open_snapshot`].
    pub fn new(store: Arc<dyn ObjectStore>, version: Version) -> Self {
        Self { store, version }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn read_row(&self, row: RowRef) -> StoreResult<Option<Arc<RowState>>> {
        self.store.read_row(row, self.version)
    }

    pub fn read_property(&self, row: RowRef, property: &str) -> StoreResult<Value> {
        self.store.read_property(row, property, self.version)
    }

    pub fn row_exists(&self, row: RowRef) -> StoreResult<bool> {
        self.store.row_exists(row, self.version)
    }

    pub fn enumerate_rows(&self, table: TableId) -> StoreResult<Vec<RowRef>> {
        self.store.enumerate_rows(table, self.version)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.version)
            .finish()
    }
}
