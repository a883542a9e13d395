//! Serial dispatch queues.
//!
//! A [`DispatchQueue`] owns one worker thread that runs submitted jobs in
//! order. Observers registered "on a queue" are installed and delivered by
//! jobs on that thread, so their callbacks never run anywhere else.

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{NotifyError, Result};

type Job = Box<dyn FnOnce() + Send>;

static NEXT_QUEUE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_QUEUE: Cell<Option<u64>> = const { Cell::new(None) };
}

struct QueueInner {
    id: u64,
    label: String,
    thread: ThreadId,
    sender: mpsc::UnboundedSender<Job>,
}

/// A serial executor backed by a dedicated thread.
///
/// Clones share the same thread. The thread exits once every strong handle
/// is dropped and the pending jobs have run.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<QueueInner>,
}

impl DispatchQueue {
    /// Start a queue whose worker thread is named `label`.
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let id = NEXT_QUEUE.fetch_add(1, Ordering::Relaxed);
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let worker_label = label.clone();
        let handle = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                CURRENT_QUEUE.with(|current| current.set(Some(id)));
                while let Some(job) = receiver.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        warn!(queue = %worker_label, "dispatched job panicked");
                    }
                }
                debug!(queue = %worker_label, "dispatch queue stopped");
            })
            .map_err(|source| NotifyError::Spawn {
                label: label.clone(),
                source,
            })?;

        debug!(queue = %label, "dispatch queue started");
        Ok(Self {
            inner: Arc::new(QueueInner {
                id,
                label,
                thread: handle.thread().id(),
                sender,
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The worker thread's id.
    pub fn thread_id(&self) -> ThreadId {
        self.inner.thread
    }

    /// Whether the caller is running on this queue's thread.
    pub fn is_current(&self) -> bool {
        CURRENT_QUEUE.with(|current| current.get() == Some(self.inner.id))
    }

    /// Submit a job. Jobs run in submission order.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.inner
            .sender
            .send(Box::new(job))
            .map_err(|_| NotifyError::QueueClosed(self.inner.label.clone()))
    }

    /// Block until every job submitted before this call has run.
    pub fn sync(&self) -> Result<()> {
        self.run_sync(|| ())
    }

    /// Run `f` on the queue and wait for its result.
    pub fn run_sync<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return Err(NotifyError::SyncOnQueue(self.inner.label.clone()));
        }
        let (tx, rx) = oneshot::channel();
        self.dispatch(move || {
            let _ = tx.send(f());
        })?;
        rx.blocking_recv()
            .map_err(|_| NotifyError::QueueClosed(self.inner.label.clone()))
    }

    /// A handle that does not keep the worker thread alive.
    pub fn downgrade(&self) -> WeakDispatchQueue {
        WeakDispatchQueue {
            id: self.inner.id,
            label: self.inner.label.clone(),
            sender: self.inner.sender.downgrade(),
        }
    }
}

impl PartialEq for DispatchQueue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for DispatchQueue {}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .finish()
    }
}

/// Non-owning queue handle, used by store subscriptions so a forgotten
/// queue can still shut down.
#[derive(Clone)]
pub struct WeakDispatchQueue {
    id: u64,
    label: String,
    sender: mpsc::WeakUnboundedSender<Job>,
}

impl WeakDispatchQueue {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Submit a job if the queue is still running. Returns `false` once it
    /// has shut down.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match self.sender.upgrade() {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => {
                debug!(queue = %self.label, "dispatch to stopped queue dropped");
                false
            }
        }
    }
}

impl fmt::Debug for WeakDispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDispatchQueue")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}
