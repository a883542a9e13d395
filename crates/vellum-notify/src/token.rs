use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverState {
    /// Created; the target context has not installed it yet.
    Registering,
    /// Installed and receiving deliveries.
    Active,
    /// Cancelled or retired after a deletion. Terminal.
    Invalidated,
}

impl ObserverState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ObserverState::Registering,
            1 => ObserverState::Active,
            _ => ObserverState::Invalidated,
        }
    }
}

/// State shared between a token and the observer it controls.
#[derive(Debug)]
pub struct TokenState {
    id: u64,
    cancelled: AtomicBool,
    state: AtomicU8,
}

impl TokenState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            cancelled: AtomicBool::new(false),
            state: AtomicU8::new(ObserverState::Registering as u8),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ObserverState {
        ObserverState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Checked before every dispatch.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Move from `Registering` to `Active`. Returns `false` if the token was
    /// invalidated first, in which case the observer must not be installed.
    pub fn activate(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.state
            .compare_exchange(
                ObserverState::Registering as u8,
                ObserverState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
            && !self.is_cancelled()
    }

    /// Stop all further deliveries. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.state
            .store(ObserverState::Invalidated as u8, Ordering::Release);
    }
}

/// Handle to a registered observer.
///
/// Cancellation is explicit: call [`invalidate`](Self::invalidate). Dropping
/// the token leaves the observer registered.
pub struct ObserverToken {
    state: Arc<TokenState>,
    keepalive: Option<Arc<dyn Any + Send + Sync>>,
}

impl ObserverToken {
    pub fn new(state: Arc<TokenState>) -> Self {
        Self {
            state,
            keepalive: None,
        }
    }

    /// Keep `owner` alive for as long as this token exists.
    pub fn with_keepalive(mut self, owner: Arc<dyn Any + Send + Sync>) -> Self {
        self.keepalive = Some(owner);
        self
    }

    pub fn id(&self) -> u64 {
        self.state.id()
    }

    /// Stop deliveries. No callback starts on the observer's own context
    /// after this returns; safe to call more than once.
    pub fn invalidate(&self) {
        self.state.cancel();
    }

    pub fn is_invalidated(&self) -> bool {
        self.state.state() == ObserverState::Invalidated
    }

    pub fn state(&self) -> ObserverState {
        self.state.state()
    }
}

impl fmt::Debug for ObserverToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverToken")
            .field("id", &self.state.id())
            .field("state", &self.state.state())
            .finish()
    }
}
