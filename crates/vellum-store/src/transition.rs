use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;
use vellum_types::{RowRef, Version};

/// The rows one commit touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: Version,
    pub to: Version,
    /// Every row written or deleted by the commit.
    pub changed: BTreeSet<RowRef>,
    /// Rows that existed at `from` and do not exist at `to`.
    pub deleted: BTreeSet<RowRef>,
}

impl Transition {
    pub fn touches(&self, row: RowRef) -> bool {
        self.changed.contains(&row)
    }
}

/// Callback run after each commit. Returning `false` unsubscribes it.
pub type TransitionCallback = Box<dyn Fn(&Transition) -> bool + Send + Sync>;

/// Handle for removing a transition subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    callback: TransitionCallback,
}

/// Fan-out of committed transitions to subscribers.
pub struct TransitionRouter {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl TransitionRouter {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, callback: TransitionCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber { id, callback });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Deliver `transition` to every subscriber, pruning the ones that ask
    /// to be removed.
    pub fn route(&self, transition: &Transition) {
        let mut subs = self.subscribers.write();
        subs.retain(|sub| {
            let keep = (sub.callback)(transition);
            if !keep {
                debug!(subscription = sub.id.0, "transition subscriber pruned");
            }
            keep
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for TransitionRouter {
    fn default() -> Self {
        Self::new()
    }
}
