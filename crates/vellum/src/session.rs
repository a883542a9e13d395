use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};
use vellum_diff::{validate_key_path, KeyPath, KeyPathFilter, RowDiffer, SchemaLookup};
use vellum_notify::{Observer, ObserverCallback, ObserverSet, TokenState};
use vellum_schema::{ObjectType, SchemaDescriptor, SchemaSet};
use vellum_store::{RowState, Snapshot, WriteBatch};
use vellum_types::{coerce, PrimaryKey, RowRef, TableId, Value, Version};

use crate::accessor::Input;
use crate::database::{Database, DatabaseInner};
use crate::error::{Error, Result};
use crate::object::{Binding, Object};
use crate::txn::Txn;

pub(crate) enum SessionKind {
    Live { owner: ThreadId },
    Frozen { snapshot: Snapshot },
}

struct SessionState {
    version: Version,
    batch: Option<WriteBatch>,
}

pub(crate) struct SessionShared {
    pub(crate) db: Arc<DatabaseInner>,
    kind: SessionKind,
    schemas: RwLock<Arc<SchemaSet>>,
    state: Mutex<SessionState>,
    observers: ObserverSet,
    delivering: AtomicBool,
}

/// A view of the database pinned at one version.
///
/// A live session belongs to the thread that opened it and moves forward on
/// [`refresh`](Session::refresh), [`begin_write`](Session::begin_write) and
/// [`commit_write`](Session::commit_write). A frozen session never moves and
/// may be read from any thread.
#[derive(Clone)]
pub struct Session {
    pub(crate) shared: Arc<SessionShared>,
}

impl Session {
    pub(crate) fn live(db: Arc<DatabaseInner>, owner: ThreadId, version: Version, schemas: Arc<SchemaSet>) -> Self {
        Self::build(db, SessionKind::Live { owner }, version, schemas)
    }

    pub(crate) fn frozen(db: Arc<DatabaseInner>, snapshot: Snapshot, schemas: Arc<SchemaSet>) -> Self {
        let version = snapshot.version();
        Self::build(db, SessionKind::Frozen { snapshot }, version, schemas)
    }

    fn build(db: Arc<DatabaseInner>, kind: SessionKind, version: Version, schemas: Arc<SchemaSet>) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                db,
                kind,
                schemas: RwLock::new(schemas),
                state: Mutex::new(SessionState { version, batch: None }),
                observers: ObserverSet::new(),
                delivering: AtomicBool::new(false),
            }),
        }
    }

    pub fn database(&self) -> Database {
        Database::from_inner(Arc::clone(&self.shared.db))
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.shared.kind, SessionKind::Frozen { .. })
    }

    /// Thread that owns a live session. Frozen sessions have no owner.
    pub fn owner(&self) -> Option<ThreadId> {
        match self.shared.kind {
            SessionKind::Live { owner } => Some(owner),
            SessionKind::Frozen { .. } => None,
        }
    }

    /// Version this session reads at. Inside a write this is the version
    /// the write started from.
    pub fn version(&self) -> Version {
        self.shared.state.lock().version
    }

    pub fn schemas(&self) -> Arc<SchemaSet> {
        Arc::clone(&self.shared.schemas.read())
    }

    pub(crate) fn set_schemas(&self, schemas: Arc<SchemaSet>) {
        *self.shared.schemas.write() = schemas;
    }

    pub fn schema(&self, class_name: &str) -> Result<Arc<SchemaDescriptor>> {
        self.schemas()
            .get(class_name)
            .cloned()
            .ok_or_else(|| Error::ClassNotFound(class_name.to_owned()))
    }

    pub fn is_in_write_transaction(&self) -> bool {
        self.shared.state.lock().batch.is_some()
    }

    /// Number of observers currently registered on this session.
    pub fn observer_count(&self) -> usize {
        self.shared.observers.len()
    }

    pub(crate) fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn check_thread(&self) -> Result<()> {
        match self.shared.kind {
            SessionKind::Live { owner } if owner != thread::current().id() => Err(Error::WrongThread),
            _ => Ok(()),
        }
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::FrozenWrite);
        }
        self.check_thread()?;
        if !self.is_in_write_transaction() {
            return Err(Error::NotInWriteTransaction);
        }
        Ok(())
    }

    /// Whether an object bound to `other` can be referenced from a write on
    /// this session.
    pub(crate) fn check_same(&self, other: &Session) -> Result<()> {
        if self.same_as(other) {
            return Ok(());
        }
        if other.is_frozen() {
            return Err(Error::InvalidOperation(
                "frozen objects cannot be referenced from a live session".into(),
            ));
        }
        if !Arc::ptr_eq(&self.shared.db, &other.shared.db) {
            return Err(Error::InvalidOperation("object belongs to a different database".into()));
        }
        Err(Error::WrongThread)
    }

    // ---- Reads ----

    pub(crate) fn read_row(&self, row: RowRef) -> Result<Option<Arc<RowState>>> {
        if let SessionKind::Frozen { snapshot } = &self.shared.kind {
            return Ok(snapshot.read_row(row)?);
        }
        let state = self.shared.state.lock();
        let store = &self.shared.db.store;
        match &state.batch {
            Some(batch) => match batch.get(row) {
                Some(staged) => Ok(staged),
                None => Ok(store.read_row(row, batch.base())?),
            },
            None => Ok(store.read_row(row, state.version)?),
        }
    }

    pub(crate) fn rows(&self, table: TableId) -> Result<Vec<RowRef>> {
        if let SessionKind::Frozen { snapshot } = &self.shared.kind {
            return Ok(snapshot.enumerate_rows(table)?);
        }
        let state = self.shared.state.lock();
        let store = &self.shared.db.store;
        match &state.batch {
            Some(batch) => Ok(overlay(store.enumerate_rows(table, batch.base())?, batch, table)),
            None => Ok(store.enumerate_rows(table, state.version)?),
        }
    }

    pub(crate) fn table_for(&self, class_name: &str) -> Option<TableId> {
        self.shared.db.store.table_id(class_name)
    }

    /// Managed handle for `row`, or `None` if the row does not exist here.
    pub(crate) fn object_at(&self, row: RowRef) -> Result<Option<Object>> {
        match self.read_row(row)? {
            Some(state) => self.bind(row, &state).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn bind(&self, row: RowRef, state: &RowState) -> Result<Object> {
        let class = self
            .shared
            .db
            .store
            .table_name(row.table)
            .ok_or_else(|| Error::InvalidOperation(format!("row {row} has no table")))?;
        Ok(self.bind_with(self.schema(&class)?, row, state))
    }

    pub(crate) fn bind_with(&self, schema: Arc<SchemaDescriptor>, row: RowRef, state: &RowState) -> Object {
        let primary_key = schema
            .primary_key_property()
            .and_then(|pk| state.get(&pk.name))
            .and_then(PrimaryKey::from_value);
        Object::managed(
            schema,
            Binding {
                session: self.clone(),
                row,
                primary_key,
            },
        )
    }

    /// Every object of `class_name` visible to this session.
    pub fn objects(&self, class_name: &str) -> Result<Vec<Object>> {
        self.check_thread()?;
        let schema = self.schema(class_name)?;
        let Some(table) = self.table_for(class_name) else {
            return Ok(Vec::new());
        };
        let mut objects = Vec::new();
        for row in self.rows(table)? {
            if let Some(state) = self.read_row(row)? {
                objects.push(self.bind_with(Arc::clone(&schema), row, &state));
            }
        }
        Ok(objects)
    }

    /// The object of `class_name` whose primary key equals `key`.
    pub fn object_for_primary_key(&self, class_name: &str, key: impl Into<Value>) -> Result<Option<Object>> {
        self.check_thread()?;
        let schema = self.schema(class_name)?;
        let pk = schema.primary_key_property().ok_or_else(|| {
            Error::InvalidOperation(format!("class '{class_name}' has no primary key"))
        })?;
        let key = coerce(key.into(), pk.property_type, pk.is_optional).map_err(|e| Error::from_type(&pk.name, e))?;
        let key = PrimaryKey::from_value(&key);
        let Some(table) = self.table_for(class_name) else {
            return Ok(None);
        };
        for row in self.rows(table)? {
            if let Some(state) = self.read_row(row)? {
                if state.get(&pk.name).and_then(PrimaryKey::from_value) == key {
                    return Ok(Some(self.bind_with(Arc::clone(&schema), row, &state)));
                }
            }
        }
        Ok(None)
    }

    // ---- Transactions ----

    /// Move a live session to the latest version and deliver pending
    /// notifications. Returns whether the version advanced.
    ///
    /// Inside a write this does nothing. Called from inside a notification
    /// callback it advances the version; the delivery pass already running
    /// picks up the new transitions before it returns.
    pub fn refresh(&self) -> Result<bool> {
        if self.is_frozen() {
            return Ok(false);
        }
        self.check_thread()?;
        let advanced = {
            let mut state = self.shared.state.lock();
            if state.batch.is_some() {
                return Ok(false);
            }
            let latest = self.shared.db.store.latest_version();
            let advanced = latest > state.version;
            if advanced {
                trace!(from = %state.version, to = %latest, "session advanced");
                state.version = latest;
            }
            advanced
        };
        self.set_schemas(self.shared.db.schemas());
        self.deliver_notifications();
        Ok(advanced)
    }

    /// Open a write transaction at the latest version.
    ///
    /// Blocks while another session holds the writer. Pending notifications
    /// are delivered first, so callbacks never see a half-written state.
    pub fn begin_write(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::FrozenWrite);
        }
        self.check_thread()?;
        if self.is_in_write_transaction() {
            return Err(Error::NestedWrite);
        }
        self.refresh()?;
        // A callback run by the refresh may have opened a write of its own.
        if self.is_in_write_transaction() {
            return Err(Error::NestedWrite);
        }
        let batch = self.shared.db.store.begin_write()?;
        {
            let mut state = self.shared.state.lock();
            state.version = batch.base();
            state.batch = Some(batch);
        }
        self.set_schemas(self.shared.db.schemas());
        debug!(base = %self.version(), "write started");
        self.deliver_notifications();
        Ok(())
    }

    /// Commit the open write and deliver notifications for it.
    pub fn commit_write(&self) -> Result<Version> {
        if self.is_frozen() {
            return Err(Error::FrozenWrite);
        }
        self.check_thread()?;
        let batch = self
            .shared
            .state
            .lock()
            .batch
            .take()
            .ok_or(Error::NotInWriteTransaction)?;
        let version = self.shared.db.store.commit_write(batch)?;
        self.shared.state.lock().version = version;
        debug!(version = %version, "write committed");
        self.deliver_notifications();
        Ok(version)
    }

    /// Discard the open write.
    ///
    /// Objects added during the write become invalidated.
    pub fn cancel_write(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::FrozenWrite);
        }
        self.check_thread()?;
        let batch = self
            .shared
            .state
            .lock()
            .batch
            .take()
            .ok_or(Error::NotInWriteTransaction)?;
        debug!(base = %batch.base(), staged = batch.len(), "write cancelled");
        self.shared.db.store.abort_write(batch);
        Ok(())
    }

    /// Run `f` inside a write, committing on `Ok` and cancelling on `Err`.
    pub fn write<R>(&self, f: impl FnOnce(&Session) -> Result<R>) -> Result<R> {
        self.begin_write()?;
        match f(self) {
            Ok(value) => {
                self.commit_write()?;
                Ok(value)
            }
            Err(err) => {
                if self.is_in_write_transaction() {
                    self.cancel_write()?;
                }
                Err(err)
            }
        }
    }

    /// Run `f` against the open write as one all-or-nothing step.
    ///
    /// Objects attached by `f` switch to managed only when it succeeds.
    pub(crate) fn with_txn<R>(&self, f: impl FnOnce(&mut Txn<'_>) -> Result<R>) -> Result<R> {
        self.check_writable()?;
        let (value, pending) = {
            let mut state = self.shared.state.lock();
            let batch = state.batch.as_mut().ok_or(Error::NotInWriteTransaction)?;
            let savepoint = batch.savepoint();
            let mut txn = Txn::new(self, batch);
            let result = f(&mut txn);
            let (batch, pending) = txn.into_parts();
            match result {
                Ok(value) => {
                    batch.release(savepoint)?;
                    (value, pending)
                }
                Err(err) => {
                    batch.rollback_to(savepoint)?;
                    return Err(err);
                }
            }
        };
        for attach in pending {
            attach.finish(self);
        }
        Ok(value)
    }

    // ---- Object lifecycle ----

    /// Create a managed object of `class_name` from `values`.
    pub fn create(&self, class_name: &str, values: impl Into<Input>) -> Result<Object> {
        self.check_writable()?;
        let object = Object::with_values(self.schema(class_name)?, values)?;
        self.with_txn(|txn| txn.attach(&object).map(|_| ()))?;
        Ok(object)
    }

    pub fn create_typed<T: ObjectType>(&self, values: impl Into<Input>) -> Result<Object> {
        self.create(T::CLASS_NAME, values)
    }

    /// Add an unmanaged object, and every unmanaged object it reaches, to
    /// this session. Adding an object already managed here does nothing.
    pub fn add(&self, object: &Object) -> Result<()> {
        self.check_writable()?;
        if let Some(binding) = object.binding() {
            return self.check_same(&binding.session);
        }
        if !self.schemas().contains(object.class_name()) {
            return Err(Error::ClassNotFound(object.class_name().to_owned()));
        }
        self.with_txn(|txn| txn.attach(object).map(|_| ()))
    }

    /// Delete a managed object. Links to it become null and list entries
    /// pointing at it are removed.
    pub fn delete(&self, object: &Object) -> Result<()> {
        let binding = object.binding().ok_or(Error::Unmanaged)?;
        if binding.session.is_frozen() {
            return Err(Error::FrozenWrite);
        }
        self.check_writable()?;
        self.check_same(&binding.session)?;
        self.with_txn(|txn| {
            if txn.read_row(binding.row)?.is_none() {
                return Err(Error::InvalidatedObject);
            }
            txn.remove(binding.row)
        })?;
        debug!(class = object.class_name(), row = %binding.row, "object deleted");
        Ok(())
    }

    /// Delete every object of every class.
    pub fn delete_all(&self) -> Result<()> {
        self.with_txn(|txn| {
            for schema in self.schemas().iter() {
                if let Some(table) = self.table_for(schema.class_name()) {
                    for row in txn.rows(table)? {
                        txn.delete_row(row);
                    }
                }
            }
            Ok(())
        })
    }

    /// A frozen session at this session's current version.
    pub fn freeze(&self) -> Result<Session> {
        if self.is_frozen() {
            return Ok(self.clone());
        }
        self.check_thread()?;
        if self.is_in_write_transaction() {
            return Err(Error::InvalidOperation("cannot freeze inside a write transaction".into()));
        }
        self.shared.db.frozen_session(self.version(), self.schemas())
    }

    // ---- Notifications ----

    pub(crate) fn key_path_filter<S: AsRef<str>>(
        &self,
        schema: &SchemaDescriptor,
        key_paths: &[S],
    ) -> Result<KeyPathFilter> {
        let lookup = SessionLookup { session: self };
        let mut paths = Vec::with_capacity(key_paths.len());
        for raw in key_paths {
            let path = KeyPath::parse(raw.as_ref())?;
            validate_key_path(&path, schema, &lookup)?;
            paths.push(path);
        }
        Ok(KeyPathFilter::from_paths(paths))
    }

    /// Register an observer starting at this session's version. Returns
    /// false if the token was invalidated before registration.
    pub(crate) fn install_observer(
        &self,
        row: RowRef,
        filter: KeyPathFilter,
        token: Arc<TokenState>,
        callback: ObserverCallback,
    ) -> bool {
        if !token.activate() {
            return false;
        }
        let observer = Observer::new(row, filter, self.version(), Arc::clone(&token), callback);
        self.shared.observers.add(Arc::new(observer));
        debug!(observer = token.id(), row = %row, "observer registered");
        true
    }

    fn deliver_notifications(&self) {
        if self.shared.observers.is_empty() {
            return;
        }
        if self.shared.delivering.swap(true, Ordering::AcqRel) {
            return;
        }
        let _delivering = DeliveryGuard(&self.shared.delivering);
        let store = &*self.shared.db.store;
        let depth = self.shared.db.config.notification_depth;
        loop {
            let to = self.version();
            let lookup = SessionLookup { session: self };
            self.shared.observers.deliver(to, |row, from, next, filter| {
                RowDiffer::new(store, &lookup, filter.required_depth(depth)).diff(row, from, next)
            });
            if self.version() == to {
                break;
            }
        }
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.shared.db.id)
            .field("frozen", &self.is_frozen())
            .field("version", &self.version())
            .field("observers", &self.observer_count())
            .finish()
    }
}

struct DeliveryGuard<'a>(&'a AtomicBool);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Resolves tables and classes against a session's schema.
pub(crate) struct SessionLookup<'a> {
    pub(crate) session: &'a Session,
}

impl SchemaLookup for SessionLookup<'_> {
    fn schema_for_table(&self, table: TableId) -> Option<Arc<SchemaDescriptor>> {
        let class = self.session.shared.db.store.table_name(table)?;
        self.session.schemas().get(&class).cloned()
    }

    fn schema_for_class(&self, class: &str) -> Option<Arc<SchemaDescriptor>> {
        self.session.schemas().get(class).cloned()
    }
}

/// Rows of `table` at the batch's base, with the batch's inserts and
/// deletes applied.
pub(crate) fn overlay(base: Vec<RowRef>, batch: &WriteBatch, table: TableId) -> Vec<RowRef> {
    let mut rows: BTreeSet<RowRef> = base.into_iter().collect();
    for (row, exists) in batch.staged_in(table) {
        if exists {
            rows.insert(row);
        } else {
            rows.remove(&row);
        }
    }
    rows.into_iter().collect()
}
