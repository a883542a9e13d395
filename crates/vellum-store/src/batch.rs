use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use vellum_types::{RowRef, TableId, Version};

use crate::error::{StoreError, StoreResult};
use crate::traits::RowState;

/// Single-writer lock shared by a store and its open batch.
#[derive(Debug, Default)]
pub struct WriterLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl WriterLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is free, then take it.
    pub fn acquire(self: &Arc<Self>) -> WriterGuard {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
        WriterGuard {
            lock: Arc::clone(self),
        }
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock()
    }
}

/// Releases the writer lock when dropped.
#[derive(Debug)]
pub struct WriterGuard {
    lock: Arc<WriterLock>,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        *self.lock.held.lock() = false;
        self.lock.released.notify_one();
    }
}

/// Rows staged on top of a base version.
///
/// `None` marks a deletion. Reads through the batch see staged rows first
/// and fall back to the base version.
#[derive(Debug)]
pub struct WriteBatch {
    base: Version,
    staged: BTreeMap<RowRef, Option<Arc<RowState>>>,
    savepoints: Vec<BTreeMap<RowRef, Option<Arc<RowState>>>>,
    guard: WriterGuard,
}

impl WriteBatch {
    pub fn new(base: Version, guard: WriterGuard) -> Self {
        Self {
            base,
            staged: BTreeMap::new(),
            savepoints: Vec::new(),
            guard,
        }
    }

    /// The committed version this batch writes on top of.
    pub fn base(&self) -> Version {
        self.base
    }

    /// `Some(state)` if the row was staged (with `None` for a deletion),
    /// `None` if the batch never touched it.
    pub fn get(&self, row: RowRef) -> Option<Option<Arc<RowState>>> {
        self.staged.get(&row).cloned()
    }

    pub fn put_row(&mut self, row: RowRef, state: RowState) {
        self.staged.insert(row, Some(Arc::new(state)));
    }

    pub fn delete_row(&mut self, row: RowRef) {
        self.staged.insert(row, None);
    }

    /// Staged rows of `table`, in row id order.
    pub fn staged_in(&self, table: TableId) -> impl Iterator<Item = (RowRef, bool)> + '_ {
        self.staged
            .iter()
            .filter(move |(r, _)| r.table == table)
            .map(|(r, s)| (*r, s.is_some()))
    }

    pub fn staged(&self) -> impl Iterator<Item = (&RowRef, &Option<Arc<RowState>>)> {
        self.staged.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Record the current staged state. Returns the savepoint index.
    pub fn savepoint(&mut self) -> usize {
        self.savepoints.push(self.staged.clone());
        self.savepoints.len() - 1
    }

    /// Restore the staged state recorded at `savepoint`, discarding it and
    /// every later savepoint.
    pub fn rollback_to(&mut self, savepoint: usize) -> StoreResult<()> {
        if savepoint >= self.savepoints.len() {
            return Err(StoreError::InvalidSavepoint(savepoint));
        }
        self.savepoints.truncate(savepoint + 1);
        if let Some(saved) = self.savepoints.pop() {
            self.staged = saved;
        }
        Ok(())
    }

    /// Keep staged changes and forget `savepoint` and every later one.
    pub fn release(&mut self, savepoint: usize) -> StoreResult<()> {
        if savepoint >= self.savepoints.len() {
            return Err(StoreError::InvalidSavepoint(savepoint));
        }
        self.savepoints.truncate(savepoint);
        Ok(())
    }

    /// Split into staged rows and the writer guard, so a backend can publish
    /// the rows before releasing the lock.
    pub(crate) fn into_parts(self) -> (BTreeMap<RowRef, Option<Arc<RowState>>>, WriterGuard) {
        (self.staged, self.guard)
    }
}
