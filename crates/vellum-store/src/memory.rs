use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use vellum_types::{RowId, RowRef, TableId, Version};

use crate::batch::{WriteBatch, WriterLock};
use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;
use crate::traits::{ObjectStore, RowState};
use crate::transition::{SubscriptionId, Transition, TransitionCallback, TransitionRouter};

/// Every committed state of one row, newest first. `None` marks a deletion.
#[derive(Debug, Default)]
struct VersionChain {
    versions: VecDeque<(Version, Option<Arc<RowState>>)>,
}

impl VersionChain {
    fn push(&mut self, version: Version, state: Option<Arc<RowState>>) {
        self.versions.push_front((version, state));
    }

    /// The state visible at `version`.
    fn at(&self, version: Version) -> Option<&Arc<RowState>> {
        self.versions
            .iter()
            .find(|(v, _)| *v <= version)
            .and_then(|(_, state)| state.as_ref())
    }
}

#[derive(Debug, Default)]
struct Tables {
    by_name: HashMap<String, TableId>,
    names: Vec<String>,
    next_row: Vec<u64>,
}

/// Multi-version store held entirely in memory.
///
/// Every committed version stays readable for the life of the store, which
/// is what frozen sessions rely on. Intended for tests and embedding.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    rows: RwLock<HashMap<RowRef, VersionChain>>,
    /// `transitions[i]` produced version `i + 1`.
    transitions: RwLock<Vec<Arc<Transition>>>,
    latest: AtomicU64,
    writer: Arc<WriterLock>,
    router: TransitionRouter,
}

impl InMemoryStore {
    /// Create a new empty store at version zero.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            rows: RwLock::new(HashMap::new()),
            transitions: RwLock::new(Vec::new()),
            latest: AtomicU64::new(0),
            writer: Arc::new(WriterLock::new()),
            router: TransitionRouter::new(),
        }
    }

    /// Number of rows that exist at the latest version.
    pub fn len(&self) -> usize {
        let latest = self.latest_version();
        self.rows
            .read()
            .values()
            .filter(|chain| chain.at(latest).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table_count(&self) -> usize {
        self.tables.read().names.len()
    }

    fn check_version(&self, version: Version) -> StoreResult<()> {
        let latest = self.latest_version();
        if version > latest {
            return Err(StoreError::VersionNotAvailable {
                requested: version,
                latest,
            });
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryStore {
    fn latest_version(&self) -> Version {
        Version(self.latest.load(Ordering::Acquire))
    }

    fn register_table(&self, class_name: &str) -> TableId {
        let mut tables = self.tables.write();
        if let Some(id) = tables.by_name.get(class_name) {
            return *id;
        }
        let id = TableId(tables.names.len() as u32);
        tables.by_name.insert(class_name.to_owned(), id);
        tables.names.push(class_name.to_owned());
        tables.next_row.push(0);
        debug!(class = class_name, table = %id, "table registered");
        id
    }

    fn table_id(&self, class_name: &str) -> Option<TableId> {
        self.tables.read().by_name.get(class_name).copied()
    }

    fn table_name(&self, table: TableId) -> Option<String> {
        self.tables.read().names.get(table.0 as usize).cloned()
    }

    fn allocate_row(&self, table: TableId) -> StoreResult<RowRef> {
        let mut tables = self.tables.write();
        let next = tables
            .next_row
            .get_mut(table.0 as usize)
            .ok_or(StoreError::UnknownTable(table))?;
        let row = RowId(*next);
        *next += 1;
        Ok(RowRef::new(table, row))
    }

    fn read_row(&self, row: RowRef, version: Version) -> StoreResult<Option<Arc<RowState>>> {
        self.check_version(version)?;
        let rows = self.rows.read();
        Ok(rows.get(&row).and_then(|chain| chain.at(version)).cloned())
    }

    fn enumerate_rows(&self, table: TableId, version: Version) -> StoreResult<Vec<RowRef>> {
        self.check_version(version)?;
        if self.table_name(table).is_none() {
            return Err(StoreError::UnknownTable(table));
        }
        let rows = self.rows.read();
        let mut found: Vec<RowRef> = rows
            .iter()
            .filter(|(r, chain)| r.table == table && chain.at(version).is_some())
            .map(|(r, _)| *r)
            .collect();
        found.sort();
        Ok(found)
    }

    fn begin_write(&self) -> StoreResult<WriteBatch> {
        let guard = self.writer.acquire();
        Ok(WriteBatch::new(self.latest_version(), guard))
    }

    fn commit_write(&self, batch: WriteBatch) -> StoreResult<Version> {
        let latest = self.latest_version();
        if batch.base() != latest {
            return Err(StoreError::StaleBatch {
                base: batch.base(),
                latest,
            });
        }
        if batch.is_empty() {
            return Ok(latest);
        }

        let (staged, guard) = batch.into_parts();
        let to = latest.next();
        let mut changed = BTreeSet::new();
        let mut deleted = BTreeSet::new();
        {
            let mut rows = self.rows.write();
            for (row, state) in staged {
                let chain = rows.entry(row).or_default();
                if state.is_none() && chain.at(latest).is_some() {
                    deleted.insert(row);
                }
                chain.push(to, state);
                changed.insert(row);
            }
        }

        let transition = Arc::new(Transition {
            from: latest,
            to,
            changed,
            deleted,
        });
        self.transitions.write().push(Arc::clone(&transition));
        self.latest.store(to.0, Ordering::Release);

        debug!(
            version = %to,
            rows = transition.changed.len(),
            deleted = transition.deleted.len(),
            "write committed"
        );

        // Route while still holding the writer lock so subscribers observe
        // transitions in commit order.
        self.router.route(&transition);
        drop(guard);
        Ok(to)
    }

    fn abort_write(&self, batch: WriteBatch) {
        debug!(base = %batch.base(), rows = batch.len(), "write aborted");
        drop(batch);
    }

    fn transition(&self, version: Version) -> Option<Arc<Transition>> {
        let index = version.previous()?.0 as usize;
        self.transitions.read().get(index).cloned()
    }

    fn subscribe_transitions(&self, callback: TransitionCallback) -> SubscriptionId {
        self.router.subscribe(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.router.unsubscribe(id)
    }

    fn open_snapshot(self: Arc<Self>, version: Version) -> StoreResult<Snapshot> {
        self.check_version(version)?;
        Ok(Snapshot::new(self, version))
    }
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("latest", &self.latest_version())
            .field("tables", &self.table_count())
            .field("rows", &self.len())
            .finish()
    }
}
