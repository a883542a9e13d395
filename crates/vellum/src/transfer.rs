use std::fmt;
use std::sync::Arc;

use vellum_types::{RowRef, Version};

use crate::database::DatabaseInner;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::session::Session;

/// A handle for moving a live object to another thread.
///
/// Created on the object's thread and resolved, once, by the session of
/// the receiving thread. Frozen objects need no reference; they can be
/// sent directly.
pub struct ThreadSafeReference {
    pub(crate) database: Arc<DatabaseInner>,
    row: RowRef,
    class_name: String,
    version: Version,
}

impl ThreadSafeReference {
    pub fn new(object: &Object) -> Result<Self> {
        let binding = object.binding().ok_or(Error::Unmanaged)?;
        if binding.session.is_frozen() {
            return Err(Error::InvalidOperation(
                "frozen objects can be shared between threads directly".into(),
            ));
        }
        binding.session.check_thread()?;
        if binding.session.read_row(binding.row)?.is_none() {
            return Err(Error::InvalidatedObject);
        }
        Ok(Self {
            database: Arc::clone(&binding.session.shared.db),
            row: binding.row,
            class_name: object.class_name().to_owned(),
            version: binding.session.version(),
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Version the reference was taken at.
    pub fn version(&self) -> Version {
        self.version
    }
}

impl fmt::Debug for ThreadSafeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadSafeReference")
            .field("class", &self.class_name)
            .field("row", &self.row)
            .field("version", &self.version)
            .finish()
    }
}

impl Session {
    /// Resolve a reference on this session's thread.
    ///
    /// The session is refreshed first if it is older than the reference.
    /// Returns `None` if the object has been deleted since.
    pub fn resolve(&self, reference: ThreadSafeReference) -> Result<Option<Object>> {
        if self.is_frozen() {
            return Err(Error::InvalidOperation("references resolve into live sessions".into()));
        }
        self.check_thread()?;
        if !Arc::ptr_eq(&reference.database, &self.shared.db) {
            return Err(Error::InvalidOperation("reference belongs to a different database".into()));
        }
        if self.version() < reference.version {
            self.refresh()?;
        }
        if !self.schemas().contains(&reference.class_name) {
            return Ok(None);
        }
        self.object_at(reference.row)
    }
}
