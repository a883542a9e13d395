use std::collections::BTreeMap;
use std::sync::Arc;

use vellum_types::{RowRef, TableId, Value, Version};

use crate::batch::WriteBatch;
use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;
use crate::transition::{SubscriptionId, Transition, TransitionCallback};

/// Property values of one row, keyed by property name.
pub type RowState = BTreeMap<String, Value>;

/// Multi-version row store.
///
/// All implementations must satisfy these invariants:
/// - Reads at a committed version are repeatable.
/// - `begin_write` hands out at most one live [`WriteBatch`] at a time.
/// - `commit_write` publishes every staged row at exactly one new version
///   and records a [`Transition`] for it.
/// - Transition subscribers are invoked in commit order, without any row
///   or table lock held.
pub trait ObjectStore: Send + Sync {
    /// The most recently committed version.
    fn latest_version(&self) -> Version;

    /// Register a table for `class_name`, returning the existing id if the
    /// class is already known.
    fn register_table(&self, class_name: &str) -> TableId;

    fn table_id(&self, class_name: &str) -> Option<TableId>;

    fn table_name(&self, table: TableId) -> Option<String>;

    /// Reserve a fresh row id in `table`. Reserved ids are never handed out
    /// again, even if the row is never written.
    fn allocate_row(&self, table: TableId) -> StoreResult<RowRef>;

    /// Read a whole row at `version`.
    ///
    /// Returns `Ok(None)` if the row does not exist at that version.
    fn read_row(&self, row: RowRef, version: Version) -> StoreResult<Option<Arc<RowState>>>;

    /// Read one property at `version`. Properties the row never stored read
    /// as `Null`.
    fn read_property(&self, row: RowRef, property: &str, version: Version) -> StoreResult<Value> {
        let state = self
            .read_row(row, version)?
            .ok_or(StoreError::RowNotFound { row, version })?;
        Ok(state.get(property).cloned().unwrap_or(Value::Null))
    }

    /// Whether `row` exists at `version`.
    fn row_exists(&self, row: RowRef, version: Version) -> StoreResult<bool> {
        Ok(self.read_row(row, version)?.is_some())
    }

    /// Rows of `table` that exist at `version`, in row id order.
    fn enumerate_rows(&self, table: TableId, version: Version) -> StoreResult<Vec<RowRef>>;

    /// Open the single write batch, blocking until any other batch is done.
    fn begin_write(&self) -> StoreResult<WriteBatch>;

    /// Publish the batch. Returns the new version, or the base version if
    /// the batch staged nothing.
    fn commit_write(&self, batch: WriteBatch) -> StoreResult<Version>;

    /// Discard the batch and release the writer lock.
    fn abort_write(&self, batch: WriteBatch);

    /// The transition that produced `version`, if it has been committed.
    fn transition(&self, version: Version) -> Option<Arc<Transition>>;

    /// Register a callback invoked after every commit. A callback that
    /// returns `false` is unsubscribed.
    fn subscribe_transitions(&self, callback: TransitionCallback) -> SubscriptionId;

    /// Remove a subscription. Returns `true` if it existed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// A read-only view pinned to `version`.
    fn open_snapshot(self: Arc<Self>, version: Version) -> StoreResult<Snapshot>;
}
