use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use vellum_schema::{schema_of, ObjectType, PropertyDescriptor, SchemaDescriptor};
use vellum_types::{PrimaryKey, PropertyType, RowRef, Value, Version};

use crate::accessor::{self, Field, FromProperty, Input, Prop, Property};
use crate::database::Database;
use crate::describe;
use crate::error::{Error, Result};
use crate::list::{LinkingObjects, List};
use crate::session::Session;

/// Stored content of one property of an unmanaged object.
#[derive(Clone)]
pub(crate) enum Slot {
    Value(Value),
    Link(Option<Object>),
    List(Vec<Item>),
}

#[derive(Clone)]
pub(crate) enum Item {
    Value(Value),
    Object(Object),
}

/// Where a managed object lives.
#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) session: Session,
    pub(crate) row: RowRef,
    pub(crate) primary_key: Option<PrimaryKey>,
}

pub(crate) enum Source {
    Unmanaged(BTreeMap<String, Slot>),
    Managed(Binding),
}

pub(crate) struct ObjectInner {
    schema: Arc<SchemaDescriptor>,
    pub(crate) source: RwLock<Source>,
}

/// An instance of a schema class.
///
/// An object starts unmanaged, holding its own values. Adding it to a
/// session turns the same handle into a managed object whose reads and
/// writes go through the session. Clones share state.
#[derive(Clone)]
pub struct Object {
    pub(crate) inner: Arc<ObjectInner>,
}

impl Object {
    /// An unmanaged object with every property at its initial value.
    pub fn new(schema: Arc<SchemaDescriptor>) -> Self {
        let slots = schema
            .persisted_properties()
            .map(|prop| (prop.name.clone(), initial_slot(prop)))
            .collect();
        Self::from_source(schema, Source::Unmanaged(slots))
    }

    /// An unmanaged object of the Rust type `T`.
    pub fn of<T: ObjectType>() -> Result<Self> {
        Ok(Self::new(schema_of::<T>()?))
    }

    /// An unmanaged object initialized from a field map or positional list.
    pub fn with_values(schema: Arc<SchemaDescriptor>, values: impl Into<Input>) -> Result<Self> {
        let object = Self::new(schema);
        object.set_values(values)?;
        Ok(object)
    }

    pub(crate) fn managed(schema: Arc<SchemaDescriptor>, binding: Binding) -> Self {
        Self::from_source(schema, Source::Managed(binding))
    }

    fn from_source(schema: Arc<SchemaDescriptor>, source: Source) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                schema,
                source: RwLock::new(source),
            }),
        }
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.inner.schema
    }

    pub fn class_name(&self) -> &str {
        self.inner.schema.class_name()
    }

    pub fn is_managed(&self) -> bool {
        matches!(*self.inner.source.read(), Source::Managed(_))
    }

    pub fn is_frozen(&self) -> bool {
        self.binding().is_some_and(|b| b.session.is_frozen())
    }

    /// True once the row behind a managed object is gone from its session.
    /// Unmanaged objects are never invalidated.
    pub fn is_invalidated(&self) -> bool {
        match self.binding() {
            None => false,
            Some(binding) => !matches!(binding.session.read_row(binding.row), Ok(Some(_))),
        }
    }

    /// Session a managed object belongs to.
    pub fn session(&self) -> Option<Session> {
        self.binding().map(|b| b.session)
    }

    pub fn database(&self) -> Option<Database> {
        self.session().map(|s| s.database())
    }

    // ---- Property access ----

    pub fn value(&self, name: &str) -> Result<Property> {
        accessor::get(self, name)
    }

    pub fn value_as<T: FromProperty>(&self, name: &str) -> Result<T> {
        T::from_property(self.value(name)?, name)
    }

    pub fn get<T: FromProperty>(&self, prop: Prop<T>) -> Result<T> {
        self.value_as(prop.name())
    }

    pub fn set<T: Into<Input>>(&self, prop: Prop<T>, value: T) -> Result<()> {
        self.set_value(prop.name(), value)
    }

    pub fn set_value(&self, name: &str, value: impl Into<Input>) -> Result<()> {
        accessor::set(self, name, value.into())
    }

    /// Assign from a field map or positional list as one step.
    pub fn set_values(&self, values: impl Into<Input>) -> Result<()> {
        accessor::set_values(self, values.into())
    }

    pub fn at(&self, name: &str) -> Field<'_> {
        Field::new(self, name)
    }

    pub fn list(&self, name: &str) -> Result<List> {
        let prop = accessor::property(self.schema(), name)?;
        if !prop.is_list() {
            return Err(Error::mismatch(name, format!("'{name}' is not a list")));
        }
        self.value_as(name)
    }

    pub fn linking_objects(&self, name: &str) -> Result<LinkingObjects> {
        let prop = accessor::property(self.schema(), name)?;
        if !prop.is_linking_objects() {
            return Err(Error::mismatch(name, format!("'{name}' is not a linking objects property")));
        }
        self.value_as(name)
    }

    // ---- Freezing ----

    /// A handle pinned at the current version of this object's session.
    pub fn freeze(&self) -> Result<Object> {
        let binding = self.binding().ok_or(Error::Unmanaged)?;
        if binding.session.is_frozen() {
            return Ok(self.clone());
        }
        binding.session.check_thread()?;
        if binding.session.is_in_write_transaction() {
            return Err(Error::InvalidOperation("cannot freeze inside a write transaction".into()));
        }
        if binding.session.read_row(binding.row)?.is_none() {
            return Err(Error::InvalidatedObject);
        }
        let frozen = binding.session.freeze()?;
        Ok(Self::managed(
            Arc::clone(self.schema()),
            Binding {
                session: frozen,
                ..binding
            },
        ))
    }

    /// The live counterpart of a frozen object on the calling thread, or
    /// `None` if it has since been deleted.
    ///
    /// The calling thread's session is refreshed to the latest version
    /// first, so the result reflects every commit since the freeze.
    pub fn thaw(&self) -> Result<Option<Object>> {
        let binding = self.binding().ok_or(Error::Unmanaged)?;
        if !binding.session.is_frozen() {
            return Ok(Some(self.clone()));
        }
        let live = binding.session.database().session()?;
        // A write already runs at the latest version.
        if !live.is_in_write_transaction() {
            live.refresh()?;
        }
        if !live.schemas().contains(self.class_name()) {
            return Ok(None);
        }
        live.object_at(binding.row)
    }

    /// Whether both handles refer to the same stored row, regardless of
    /// version or thread.
    pub fn is_same_object(&self, other: &Object) -> bool {
        match (self.binding(), other.binding()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a.session.shared.db, &b.session.shared.db) && a.row == b.row,
            (None, None) => self.ptr_eq(other),
            _ => false,
        }
    }

    // ---- Internals ----

    pub(crate) fn binding(&self) -> Option<Binding> {
        match &*self.inner.source.read() {
            Source::Managed(binding) => Some(binding.clone()),
            Source::Unmanaged(_) => None,
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn unmanaged_slots(&self) -> Option<BTreeMap<String, Slot>> {
        match &*self.inner.source.read() {
            Source::Unmanaged(slots) => Some(slots.clone()),
            Source::Managed(_) => None,
        }
    }

    /// Mutate the slots of an unmanaged object in place.
    pub(crate) fn store_slots(&self, f: impl FnOnce(&mut BTreeMap<String, Slot>)) -> Result<()> {
        match &mut *self.inner.source.write() {
            Source::Unmanaged(slots) => {
                f(slots);
                Ok(())
            }
            Source::Managed(_) => Err(Error::InvalidOperation(
                "object was added to a session while being modified".into(),
            )),
        }
    }

    pub(crate) fn manage(&self, binding: Binding) {
        *self.inner.source.write() = Source::Managed(binding);
    }

    fn identity(&self) -> Identity {
        match self.binding() {
            None => Identity::Unmanaged(Arc::as_ptr(&self.inner) as usize),
            Some(binding) if binding.session.is_frozen() => Identity::Frozen {
                database: binding.session.shared.db.id,
                version: binding.session.version(),
                row: binding.row,
            },
            Some(binding) => Identity::Live {
                database: binding.session.shared.db.id,
                class: self.class_name().to_owned(),
                key: match binding.primary_key {
                    Some(pk) => LiveKey::Primary(pk),
                    None => LiveKey::Row(binding.row),
                },
            },
        }
    }
}

fn initial_slot(prop: &PropertyDescriptor) -> Slot {
    match prop.property_type {
        PropertyType::Link => Slot::Link(None),
        PropertyType::List => match prop.initial_value() {
            Value::List(values) => Slot::List(values.into_iter().map(Item::Value).collect()),
            _ => Slot::List(Vec::new()),
        },
        _ => Slot::Value(prop.initial_value()),
    }
}

/// Equality key. Unmanaged objects are equal only to themselves; live
/// objects compare by primary key, or by row when the class has none;
/// frozen objects compare by row and version.
#[derive(PartialEq, Eq, Hash)]
enum Identity {
    Unmanaged(usize),
    Live { database: u64, class: String, key: LiveKey },
    Frozen { database: u64, version: Version, row: RowRef },
}

#[derive(PartialEq, Eq, Hash)]
enum LiveKey {
    Primary(PrimaryKey),
    Row(RowRef),
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.identity() == other.identity()
    }
}

impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe::describe(f, self)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Object");
        s.field("class", &self.class_name());
        match self.binding() {
            None => s.field("managed", &false),
            Some(binding) => s
                .field("row", &binding.row)
                .field("frozen", &binding.session.is_frozen()),
        };
        s.finish()
    }
}
