//! Per-type schema cache.
//!
//! Rust types describe their persisted shape through [`ObjectType`]. The
//! descriptor is built on first use and then shared for the life of the
//! process, so every object of the type points at the same `Arc`.
//!
//! Descriptors are also indexed by class name, so unmanaged objects can
//! build nested link targets without a database.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::SchemaResult;
use crate::schema::{SchemaBuilder, SchemaDescriptor};

/// A Rust type that maps to a persisted object class.
pub trait ObjectType: 'static {
    /// Name of the class in the store.
    const CLASS_NAME: &'static str;

    /// Add this class's properties to `builder`, in declaration order.
    fn declare(builder: SchemaBuilder) -> SchemaBuilder;
}

static SCHEMAS: Lazy<RwLock<HashMap<TypeId, Arc<SchemaDescriptor>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static CLASSES: Lazy<RwLock<HashMap<String, Arc<SchemaDescriptor>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// The cached descriptor for `T`, building it on first use.
///
/// Build failures are not cached; a malformed declaration fails the same way
/// on every call.
pub fn schema_of<T: ObjectType>() -> SchemaResult<Arc<SchemaDescriptor>> {
    let key = TypeId::of::<T>();
    if let Some(schema) = SCHEMAS.read().get(&key) {
        return Ok(Arc::clone(schema));
    }

    let built = Arc::new(T::declare(SchemaBuilder::new(T::CLASS_NAME)).build()?);
    let mut cache = SCHEMAS.write();
    let schema = cache.entry(key).or_insert_with(|| {
        debug!(class = T::CLASS_NAME, properties = built.len(), "schema built");
        built
    });
    register_class(schema);
    Ok(Arc::clone(schema))
}

/// Make `schema` resolvable by class name. The first registration of a
/// name wins.
pub fn register_class(schema: &Arc<SchemaDescriptor>) {
    CLASSES
        .write()
        .entry(schema.class_name().to_owned())
        .or_insert_with(|| Arc::clone(schema));
}

/// The descriptor registered for `class_name`, if any.
pub fn class_schema(class_name: &str) -> Option<Arc<SchemaDescriptor>> {
    CLASSES.read().get(class_name).cloned()
}
