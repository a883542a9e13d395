//! Versioned object storage for Vellum.
//!
//! The object-access layer never touches storage directly. It talks to an
//! [`ObjectStore`]: a multi-version row store that can read a row at any
//! retained version, stage writes in a single-writer [`WriteBatch`], commit
//! them atomically as a new [`Version`](vellum_types::Version), and report
//! which rows each commit touched.
//!
//! # Storage Backends
//!
//! - [`InMemoryStore`] -- version-chain store held entirely in memory
//!
//! # Design Rules
//!
//! 1. Committed versions are immutable; readers pinned to a version never
//!    observe later writes.
//! 2. At most one write batch is open per store. Other writers block until
//!    it is committed, aborted or dropped.
//! 3. A commit is all-or-nothing: every staged row becomes visible at one new
//!    version, or none does.
//! 4. Row ids are never reused, so a deleted row stays deleted.
//! 5. Transition subscribers run in commit order, with no data lock held.

pub mod batch;
pub mod error;
pub mod memory;
pub mod snapshot;
pub mod traits;
pub mod transition;

// Re-export primary types at crate root for ergonomic imports.
pub use batch::{WriteBatch, WriterGuard, WriterLock};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use snapshot::Snapshot;
pub use traits::{ObjectStore, RowState};
pub use transition::{SubscriptionId, Transition, TransitionCallback, TransitionRouter};
