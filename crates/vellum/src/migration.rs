//! Schema migration.
//!
//! [`Database::migrate`] swaps the schema set inside a single write. Rows
//! of classes present in both sets are reshaped first; the caller's
//! closure then sees frozen handles on the old shape next to live handles
//! on the new one.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};
use vellum_schema::{PropertyDescriptor, SchemaDescriptor, SchemaSet};
use vellum_store::RowState;
use vellum_types::{coerce, PropertyType, Value};

use crate::accessor::Input;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::session::Session;

/// Handle passed to a migration closure.
pub struct Migration<'a> {
    session: &'a Session,
    old: Session,
    old_schemas: Arc<SchemaSet>,
    new_schemas: Arc<SchemaSet>,
}

impl Migration<'_> {
    pub fn old_schema(&self) -> &SchemaSet {
        &self.old_schemas
    }

    pub fn new_schema(&self) -> &SchemaSet {
        &self.new_schemas
    }

    /// Visit every object of `class_name`.
    ///
    /// Rows that existed before the migration come first, as a frozen
    /// old-shape handle paired with the live new-shape handle (`None` when
    /// the class was removed or the row was deleted by the migration).
    /// Objects created during the migration follow with no old handle.
    pub fn enumerate_objects<F>(&self, class_name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(Option<&Object>, Option<&Object>) -> Result<()>,
    {
        let in_old = self.old_schemas.contains(class_name);
        let in_new = self.new_schemas.contains(class_name);
        if !in_old && !in_new {
            return Err(Error::ClassNotFound(class_name.to_owned()));
        }

        let mut seen = BTreeSet::new();
        if in_old {
            for old in self.old.objects(class_name)? {
                let row = old.binding().map(|b| b.row);
                let new = match row {
                    Some(row) if in_new => {
                        seen.insert(row);
                        self.session.object_at(row)?
                    }
                    _ => None,
                };
                f(Some(&old), new.as_ref())?;
            }
        }
        if in_new {
            for new in self.session.objects(class_name)? {
                let created = new.binding().is_some_and(|b| !seen.contains(&b.row));
                if created {
                    f(None, Some(&new))?;
                }
            }
        }
        Ok(())
    }

    /// Create an object under the new schema.
    pub fn create(&self, class_name: &str, values: impl Into<Input>) -> Result<Object> {
        self.session.create(class_name, values)
    }

    /// Delete a live object.
    pub fn delete(&self, object: &Object) -> Result<()> {
        self.session.delete(object)
    }
}

impl Database {
    /// Replace the schema set, running `migration` inside the same write.
    ///
    /// On error nothing is committed and the previous schema set stays in
    /// effect.
    pub fn migrate<F>(
        &self,
        schema_version: u64,
        schemas: impl IntoIterator<Item = Arc<SchemaDescriptor>>,
        migration: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Migration<'_>) -> Result<()>,
    {
        let current = self.schema_version();
        if schema_version < current {
            return Err(Error::InvalidOperation(format!(
                "schema version {schema_version} is older than {current}"
            )));
        }
        let new_schemas = SchemaSet::from_schemas(schemas)?;
        new_schemas.validate()?;
        let new_schemas = Arc::new(new_schemas);

        let session = self.session()?;
        session.begin_write()?;
        let old_schemas = self.schemas();
        let result = self.run_migration(&session, &old_schemas, &new_schemas, migration);
        match result {
            Ok(()) => {
                let version = session.commit_write()?;
                self.inner.set_schema_version(schema_version);
                info!(
                    database = self.inner.id,
                    schema_version,
                    version = %version,
                    classes = new_schemas.len(),
                    "migration complete"
                );
                Ok(())
            }
            Err(err) => {
                if session.is_in_write_transaction() {
                    session.cancel_write()?;
                }
                self.inner.set_schemas(Arc::clone(&old_schemas));
                session.set_schemas(old_schemas);
                info!(database = self.inner.id, schema_version, error = %err, "migration aborted");
                Err(err)
            }
        }
    }

    fn run_migration<F>(
        &self,
        session: &Session,
        old_schemas: &Arc<SchemaSet>,
        new_schemas: &Arc<SchemaSet>,
        migration: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Migration<'_>) -> Result<()>,
    {
        let old = self.inner.frozen_session(session.version(), Arc::clone(old_schemas))?;
        self.register_tables(new_schemas);
        self.inner.set_schemas(Arc::clone(new_schemas));
        session.set_schemas(Arc::clone(new_schemas));

        for schema in new_schemas.iter() {
            if let Some(previous) = old_schemas.get(schema.class_name()) {
                reshape(session, previous, schema)?;
            }
        }

        let mut handle = Migration {
            session,
            old,
            old_schemas: Arc::clone(old_schemas),
            new_schemas: Arc::clone(new_schemas),
        };
        migration(&mut handle)
    }
}

/// Rewrite every row of one class to the new property layout.
fn reshape(session: &Session, old: &SchemaDescriptor, new: &SchemaDescriptor) -> Result<()> {
    let Some(table) = session.table_for(new.class_name()) else {
        return Ok(());
    };
    session.with_txn(|txn| {
        let mut rewritten = 0usize;
        for row in txn.rows(table)? {
            let Some(state) = txn.read_row(row)? else {
                continue;
            };
            let reshaped = reshape_row(&state, old, new);
            if reshaped != *state {
                txn.put_row(row, reshaped);
                rewritten += 1;
            }
        }
        debug!(class = new.class_name(), rewritten, "rows reshaped");
        Ok(())
    })
}

fn reshape_row(state: &RowState, old: &SchemaDescriptor, new: &SchemaDescriptor) -> RowState {
    let mut reshaped = RowState::new();
    for prop in new.persisted_properties() {
        let carried = old
            .lookup(&prop.name)
            .filter(|previous| previous.is_persisted())
            .and_then(|previous| state.get(&prop.name).and_then(|value| carry(previous, prop, value)));
        reshaped.insert(prop.name.clone(), carried.unwrap_or_else(|| prop.initial_value()));
    }
    reshaped
}

/// The stored value of `old` reinterpreted for `new`, if it still fits.
fn carry(old: &PropertyDescriptor, new: &PropertyDescriptor, value: &Value) -> Option<Value> {
    match new.property_type {
        PropertyType::Link => {
            (old.property_type == PropertyType::Link && old.object_class == new.object_class).then(|| value.clone())
        }
        PropertyType::List => {
            if old.property_type != PropertyType::List || old.element_type != new.element_type {
                return None;
            }
            if new.element_type == Some(PropertyType::Link) {
                return (old.object_class == new.object_class).then(|| value.clone());
            }
            let element = new.element_type?;
            let Value::List(items) = value else {
                return None;
            };
            items
                .iter()
                .map(|item| coerce(item.clone(), element, new.is_optional).ok())
                .collect::<Option<Vec<_>>>()
                .map(Value::List)
        }
        PropertyType::LinkingObjects => None,
        ty => {
            if !old.property_type.is_scalar() {
                return None;
            }
            coerce(value.clone(), ty, new.is_optional).ok()
        }
    }
}
