//! Object observation.
//!
//! Inline observers run on the thread that owns the object's session,
//! whenever that session refreshes, begins a write, or commits. Observers
//! bound to a [`DispatchQueue`] are registered asynchronously on the queue,
//! which keeps its own session per database and refreshes it after every
//! commit.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use vellum_diff::KeyPathFilter;
use vellum_notify::{DispatchQueue, ObjectChange, ObserverCallback, ObserverToken, TokenState, WeakDispatchQueue};
use vellum_store::Transition;
use vellum_types::Version;

use crate::database::{Database, DatabaseInner};
use crate::error::{Error, Result};
use crate::object::Object;
use crate::session::Session;
use crate::transfer::ThreadSafeReference;

thread_local! {
    static QUEUE_SESSIONS: RefCell<HashMap<u64, Session>> = RefCell::new(HashMap::new());
}

impl Object {
    /// Observe every change to this object.
    pub fn observe<F>(&self, callback: F) -> Result<ObserverToken>
    where
        F: FnMut(ObjectChange) + Send + 'static,
    {
        self.observe_key_paths::<&str, F>(&[], callback)
    }

    /// Observe changes reachable through `key_paths`. An empty slice
    /// observes everything.
    ///
    /// Delivered changes always list every property that changed, whichever
    /// path made the transition relevant.
    pub fn observe_key_paths<S, F>(&self, key_paths: &[S], callback: F) -> Result<ObserverToken>
    where
        S: AsRef<str>,
        F: FnMut(ObjectChange) + Send + 'static,
    {
        let (session, filter) = self.observable(key_paths)?;
        let binding = self.binding().ok_or(Error::Unmanaged)?;
        let token = TokenState::new();
        session.install_observer(binding.row, filter, Arc::clone(&token), Box::new(callback));
        let keepalive: Arc<dyn Any + Send + Sync> = session.shared.clone();
        Ok(ObserverToken::new(token).with_keepalive(keepalive))
    }

    /// Observe this object with callbacks delivered on `queue`.
    ///
    /// Registration completes asynchronously on the queue; the first
    /// delivered change is relative to the object's state at that point.
    /// Invalidating the token before registration completes means no
    /// callback is ever made.
    pub fn observe_on<S, F>(&self, queue: &DispatchQueue, key_paths: &[S], callback: F) -> Result<ObserverToken>
    where
        S: AsRef<str>,
        F: FnMut(ObjectChange) + Send + 'static,
    {
        let (_, filter) = self.observable(key_paths)?;
        let reference = ThreadSafeReference::new(self)?;
        let token = TokenState::new();
        let weak = queue.downgrade();
        let pending = Arc::clone(&token);
        let callback: ObserverCallback = Box::new(callback);
        queue.dispatch(move || register_on_queue(weak, reference, filter, pending, callback))?;
        Ok(ObserverToken::new(token))
    }

    /// Checks shared by every registration path.
    fn observable<S: AsRef<str>>(&self, key_paths: &[S]) -> Result<(Session, KeyPathFilter)> {
        let binding = self.binding().ok_or(Error::Unmanaged)?;
        if binding.session.is_frozen() {
            return Err(Error::InvalidOperation("frozen objects cannot be observed".into()));
        }
        binding.session.check_thread()?;
        if binding.session.read_row(binding.row)?.is_none() {
            return Err(Error::InvalidatedObject);
        }
        let filter = binding.session.key_path_filter(self.schema(), key_paths)?;
        Ok((binding.session, filter))
    }
}

impl Database {
    /// A new serial queue labelled under this database's queue prefix.
    pub fn dispatch_queue(&self, name: &str) -> Result<DispatchQueue> {
        Ok(DispatchQueue::new(self.config().queue_label(name))?)
    }
}

fn register_on_queue(
    queue: WeakDispatchQueue,
    reference: ThreadSafeReference,
    filter: KeyPathFilter,
    token: Arc<TokenState>,
    callback: ObserverCallback,
) {
    if token.is_cancelled() {
        token.cancel();
        return;
    }
    let session = queue_session(&reference.database, &queue);
    match session.resolve(reference) {
        Ok(Some(object)) => {
            if let Some(binding) = object.binding() {
                session.install_observer(binding.row, filter, token, callback);
            }
        }
        Ok(None) => {
            debug!(observer = token.id(), "object deleted before registration");
            token.cancel();
        }
        Err(err) => {
            warn!(observer = token.id(), error = %err, "queue registration failed");
            token.cancel();
        }
    }
}

/// The calling queue thread's session for `db`, created and subscribed to
/// commits on first use.
fn queue_session(db: &Arc<DatabaseInner>, queue: &WeakDispatchQueue) -> Session {
    if let Some(session) = QUEUE_SESSIONS.with(|sessions| sessions.borrow().get(&db.id).cloned()) {
        return session;
    }
    let session = db.live_session();
    QUEUE_SESSIONS.with(|sessions| sessions.borrow_mut().insert(db.id, session.clone()));

    let database = db.id;
    let queue = queue.clone();
    db.store.subscribe_transitions(Box::new(move |transition: &Transition| {
        let to = transition.to;
        queue.dispatch(move || refresh_queue_session(database, to))
    }));
    debug!(database, thread = ?session.owner(), "queue session opened");
    session
}

fn refresh_queue_session(database: u64, to: Version) {
    let Some(session) = QUEUE_SESSIONS.with(|sessions| sessions.borrow().get(&database).cloned()) else {
        return;
    };
    if session.version() >= to {
        return;
    }
    if let Err(err) = session.refresh() {
        warn!(database, error = %err, "queue session refresh failed");
    }
}
