use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};
use vellum_diff::{DiffResult, KeyPathFilter, ObjectDiff};
use vellum_types::{RowRef, Version};

use crate::change::ObjectChange;
use crate::token::{ObserverState, TokenState};

/// Callback receiving one change per delivered transition.
pub type ObserverCallback = Box<dyn FnMut(ObjectChange) + Send>;

/// One registered observer on one row.
///
/// `last_version` is the baseline captured at registration, then the last
/// version this observer has processed. Advancing walks forward one
/// transition at a time.
pub struct Observer {
    row: RowRef,
    filter: KeyPathFilter,
    token: Arc<TokenState>,
    last_version: Mutex<Version>,
    callback: Mutex<ObserverCallback>,
}

impl Observer {
    pub fn new(
        row: RowRef,
        filter: KeyPathFilter,
        baseline: Version,
        token: Arc<TokenState>,
        callback: ObserverCallback,
    ) -> Self {
        Self {
            row,
            filter,
            token,
            last_version: Mutex::new(baseline),
            callback: Mutex::new(callback),
        }
    }

    pub fn row(&self) -> RowRef {
        self.row
    }

    pub fn filter(&self) -> &KeyPathFilter {
        &self.filter
    }

    pub fn last_version(&self) -> Version {
        *self.last_version.lock()
    }

    pub fn is_retired(&self) -> bool {
        self.token.state() == ObserverState::Invalidated
    }

    /// Process every transition after the last one seen, up to `to`.
    ///
    /// `diff` is asked for the row's diff across each single transition.
    /// A diff error retires the observer. Returns the number of callbacks
    /// invoked.
    pub fn advance<F>(&self, to: Version, mut diff: F) -> usize
    where
        F: FnMut(RowRef, Version, Version, &KeyPathFilter) -> DiffResult<ObjectDiff>,
    {
        let mut delivered = 0;
        loop {
            if self.token.is_cancelled() {
                self.token.cancel();
                return delivered;
            }
            let from = self.last_version();
            if from >= to {
                return delivered;
            }
            let next = from.next();
            let result = diff(self.row, from, next, &self.filter);
            *self.last_version.lock() = next;

            match result {
                Ok(ObjectDiff::Unchanged) => {}
                Ok(ObjectDiff::Deleted) => {
                    if self.dispatch(ObjectChange::Deleted) {
                        delivered += 1;
                    }
                    self.token.cancel();
                    debug!(observer = self.token.id(), row = %self.row, "observer retired after deletion");
                    return delivered;
                }
                Ok(ObjectDiff::Changed(changes)) => {
                    if self.filter.matches(&changes.paths)
                        && self.dispatch(ObjectChange::Changed {
                            properties: changes.properties,
                        })
                    {
                        delivered += 1;
                    }
                }
                Err(err) => {
                    // Delivering later transitions would skip this one.
                    self.token.cancel();
                    warn!(observer = self.token.id(), version = %next, error = %err, "observer retired after diff failure");
                    return delivered;
                }
            }
        }
    }

    fn dispatch(&self, change: ObjectChange) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let mut callback = self.callback.lock();
        (callback)(change);
        true
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.token.id())
            .field("row", &self.row)
            .field("filter", &self.filter)
            .field("last_version", &self.last_version())
            .finish()
    }
}

/// The observers owned by one execution context.
#[derive(Default)]
pub struct ObserverSet {
    observers: RwLock<Vec<Arc<Observer>>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<Observer>) {
        self.observers.write().push(observer);
    }

    /// Number of observers that have not been retired.
    pub fn len(&self) -> usize {
        self.observers
            .read()
            .iter()
            .filter(|o| !o.is_retired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance every observer to `to`, then drop retired ones.
    ///
    /// No lock is held while callbacks run, so callbacks may register new
    /// observers; those start at their own baseline.
    pub fn deliver<F>(&self, to: Version, mut diff: F) -> usize
    where
        F: FnMut(RowRef, Version, Version, &KeyPathFilter) -> DiffResult<ObjectDiff>,
    {
        let current: Vec<Arc<Observer>> = self.observers.read().clone();
        let delivered: usize = current.iter().map(|o| o.advance(to, &mut diff)).sum();
        self.observers.write().retain(|o| !o.is_retired());
        if delivered > 0 {
            debug!(version = %to, delivered, "notifications delivered");
        }
        delivered
    }
}
