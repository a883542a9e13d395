//! Change notification plumbing for Vellum.
//!
//! Observers are registered against one row, optionally scoped by key
//! paths, and advanced one version transition at a time: each transition is
//! diffed separately, so an observer sees every transition it is sensitive
//! to exactly once and in increasing version order. Delivery happens on the
//! execution context that owns the observer; a [`DispatchQueue`] provides a
//! serial context backed by its own thread.

pub mod change;
pub mod error;
pub mod observer;
pub mod queue;
pub mod token;

pub use change::ObjectChange;
pub use error::{NotifyError, Result};
pub use observer::{Observer, ObserverCallback, ObserverSet};
pub use queue::{DispatchQueue, WeakDispatchQueue};
pub use token::{ObserverState, ObserverToken, TokenState};

pub use vellum_diff::{KeyPath, KeyPathFilter, PropertyChange};
