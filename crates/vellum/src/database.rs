use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use vellum_schema::{register_class, SchemaDescriptor, SchemaSet};
use vellum_store::{InMemoryStore, ObjectStore};
use vellum_types::Version;

use crate::config::Configuration;
use crate::error::Result;
use crate::session::{Session, SessionShared};

static NEXT_DATABASE: AtomicU64 = AtomicU64::new(1);

pub(crate) struct DatabaseInner {
    pub(crate) id: u64,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) config: Configuration,
    schemas: RwLock<Arc<SchemaSet>>,
    schema_version: AtomicU64,
    live: Mutex<HashMap<ThreadId, Weak<SessionShared>>>,
    frozen: Mutex<HashMap<(Version, usize), Weak<SessionShared>>>,
}

impl DatabaseInner {
    pub(crate) fn schemas(&self) -> Arc<SchemaSet> {
        Arc::clone(&self.schemas.read())
    }

    pub(crate) fn set_schemas(&self, schemas: Arc<SchemaSet>) {
        *self.schemas.write() = schemas;
    }

    pub(crate) fn schema_version(&self) -> u64 {
        self.schema_version.load(Ordering::Acquire)
    }

    pub(crate) fn set_schema_version(&self, version: u64) {
        self.schema_version.store(version, Ordering::Release);
    }

    /// The live session for the calling thread, created on first use.
    pub(crate) fn live_session(self: &Arc<Self>) -> Session {
        let owner = thread::current().id();
        let mut live = self.live.lock();
        if let Some(shared) = live.get(&owner).and_then(Weak::upgrade) {
            return Session { shared };
        }
        live.retain(|_, weak| weak.strong_count() > 0);
        let session = Session::live(Arc::clone(self), owner, self.store.latest_version(), self.schemas());
        live.insert(owner, Arc::downgrade(&session.shared));
        debug!(database = self.id, thread = ?owner, "live session opened");
        session
    }

    /// A frozen session pinned at `version`, shared with any other frozen
    /// handle at the same version and schema.
    pub(crate) fn frozen_session(self: &Arc<Self>, version: Version, schemas: Arc<SchemaSet>) -> Result<Session> {
        let key = (version, Arc::as_ptr(&schemas) as usize);
        let mut frozen = self.frozen.lock();
        if let Some(shared) = frozen.get(&key).and_then(Weak::upgrade) {
            return Ok(Session { shared });
        }
        frozen.retain(|_, weak| weak.strong_count() > 0);
        let snapshot = Arc::clone(&self.store).open_snapshot(version)?;
        let session = Session::frozen(Arc::clone(self), snapshot, schemas);
        frozen.insert(key, Arc::downgrade(&session.shared));
        debug!(database = self.id, version = %version, "frozen session opened");
        Ok(session)
    }

    fn register_tables(&self, schemas: &SchemaSet) {
        for schema in schemas.iter() {
            self.store.register_table(schema.class_name());
            register_class(schema);
        }
    }
}

/// Handle to an open database.
///
/// Cloning is cheap; every clone refers to the same store. Sessions are
/// obtained per thread through [`Database::session`].
#[derive(Clone)]
pub struct Database {
    pub(crate) inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open an in-memory database holding `schemas`.
    pub fn open(
        config: Configuration,
        schemas: impl IntoIterator<Item = Arc<SchemaDescriptor>>,
    ) -> Result<Self> {
        let schemas = SchemaSet::from_schemas(schemas)?;
        Self::with_store(Arc::new(InMemoryStore::new()), config, schemas)
    }

    /// Open a database over an existing store.
    pub fn with_store(store: Arc<dyn ObjectStore>, config: Configuration, schemas: SchemaSet) -> Result<Self> {
        schemas.validate()?;
        let inner = Arc::new(DatabaseInner {
            id: NEXT_DATABASE.fetch_add(1, Ordering::Relaxed),
            store,
            schema_version: AtomicU64::new(config.schema_version),
            config,
            schemas: RwLock::new(Arc::new(schemas)),
            live: Mutex::new(HashMap::new()),
            frozen: Mutex::new(HashMap::new()),
        });
        let schemas = inner.schemas();
        inner.register_tables(&schemas);
        info!(database = inner.id, classes = schemas.len(), "database opened");
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<DatabaseInner>) -> Self {
        Self { inner }
    }

    /// The session owned by the calling thread.
    pub fn session(&self) -> Result<Session> {
        Ok(self.inner.live_session())
    }

    pub fn schemas(&self) -> Arc<SchemaSet> {
        self.inner.schemas()
    }

    pub fn schema_version(&self) -> u64 {
        self.inner.schema_version()
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.store
    }

    /// Most recently committed version.
    pub fn latest_version(&self) -> Version {
        self.inner.store.latest_version()
    }

    pub(crate) fn register_tables(&self, schemas: &SchemaSet) {
        self.inner.register_tables(schemas);
    }
}

impl PartialEq for Database {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Database {}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.inner.id)
            .field("latest_version", &self.latest_version())
            .field("schema_version", &self.schema_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{all_types_schema, bool_schema, test_database};
    use vellum_schema::{PropertyDescriptor, SchemaError};

    #[test]
    fn open_registers_tables() {
        let db = test_database();
        assert!(db.store().table_id("AllTypes").is_some());
        assert!(db.store().table_id("BoolObject").is_some());
        assert_eq!(db.latest_version(), Version::ZERO);
    }

    #[test]
    fn open_rejects_dangling_links() {
        let orphan = SchemaDescriptor::builder("Orphan")
            .property(PropertyDescriptor::link("owner", "Nobody"))
            .build()
            .unwrap();
        let err = Database::open(Configuration::default(), [Arc::new(orphan)]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Schema(SchemaError::UnknownTargetClass { .. })
        ));
    }

    #[test]
    fn open_rejects_duplicate_classes() {
        let err = Database::open(Configuration::default(), [bool_schema(), bool_schema()]).unwrap_err();
        assert!(matches!(err, crate::Error::Schema(SchemaError::DuplicateClass(_))));
    }

    #[test]
    fn one_session_per_thread() {
        let db = test_database();
        let a = db.session().unwrap();
        let b = db.session().unwrap();
        assert_eq!(a, b);

        let other = thread::spawn({
            let db = db.clone();
            move || db.session().unwrap().owner()
        })
        .join()
        .unwrap();
        assert_ne!(other, a.owner());
    }

    #[test]
    fn frozen_sessions_are_shared_per_version() {
        let db = test_database();
        let schemas = db.schemas();
        let a = db.inner.frozen_session(Version::ZERO, Arc::clone(&schemas)).unwrap();
        let b = db.inner.frozen_session(Version::ZERO, schemas).unwrap();
        assert_eq!(a, b);
        assert!(a.is_frozen());
    }

    #[test]
    fn schema_version_starts_at_config() {
        let config = Configuration { schema_version: 3, ..Default::default() };
        let db = Database::open(config, [all_types_schema(), bool_schema()]).unwrap();
        assert_eq!(db.schema_version(), 3);
    }
}
