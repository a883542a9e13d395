//! Vellum: an embedded object database with live, versioned objects.
//!
//! Applications describe classes with [`SchemaDescriptor`]s (or derive them
//! through [`ObjectType`]), open a [`Database`], and work with [`Object`]s
//! through a per-thread [`Session`]. Objects start unmanaged, become managed
//! when added inside a write, and can be frozen into immutable snapshots
//! that cross threads freely.
//!
//! # Key Types
//!
//! - [`Database`] -- shared handle to the store and its schema set
//! - [`Session`] -- thread-confined view pinned at one version; owns writes
//! - [`Object`] -- dynamic accessor over an unmanaged, live or frozen object
//! - [`List`] / [`LinkingObjects`] -- to-many properties and their inverses
//! - [`ObserverToken`] -- handle for a change subscription on one object
//! - [`ThreadSafeReference`] -- hands a live object to another thread
//! - [`Migration`] -- callback context for schema changes
//!
//! # Design Rules
//!
//! 1. Live sessions and live objects are confined to the thread that opened
//!    them. Frozen handles are not.
//! 2. Every managed mutation happens inside a write transaction and is
//!    all-or-nothing per call.
//! 3. Primary keys never change once an object is managed.
//! 4. Observers see each committed transition once, in version order, on
//!    their own thread or queue.
//! 5. No lock is held while a user callback runs.

pub mod accessor;
pub mod config;
pub mod database;
mod describe;
pub mod error;
pub mod list;
pub mod migration;
pub mod object;
mod observe;
pub mod session;
pub mod transfer;
mod txn;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod testing;

pub use accessor::{Field, FromProperty, Input, Prop, Property};
pub use config::Configuration;
pub use database::Database;
pub use error::{Error, Result};
pub use list::{LinkingObjects, List};
pub use migration::Migration;
pub use object::Object;
pub use session::Session;
pub use transfer::ThreadSafeReference;

// Re-export the types applications touch directly.
pub use vellum_notify::{DispatchQueue, ObjectChange, ObserverState, ObserverToken, PropertyChange};
pub use vellum_schema::{ObjectType, PropertyDescriptor, SchemaDescriptor, SchemaSet};
pub use vellum_types::{DateTime, Decimal, ObjectId, PropertyType, Utc, Value, Version};
