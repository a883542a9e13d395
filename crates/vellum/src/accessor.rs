//! Property access shared by every object, managed or not.
//!
//! [`Property`] is what a read returns and [`Input`] is what a write
//! accepts. Reads and writes check, in order: that the property exists,
//! that it may be written, that the object is usable from this thread and
//! transaction, and finally that the value fits the property's type.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use vellum_schema::{class_schema, PropertyDescriptor, SchemaDescriptor};
use vellum_types::{coerce, DateTime, Decimal, ObjectId, PropertyType, Utc, Value};

use crate::error::{Error, Result};
use crate::list::{LinkingObjects, List};
use crate::object::{Binding, Item, Object, Slot, Source};

/// The value of one property as read from an object.
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    /// A scalar, or `Value::Null` for an unset optional scalar.
    Value(Value),
    /// A link, `None` when unset.
    Object(Option<Object>),
    List(List),
    LinkingObjects(LinkingObjects),
}

impl Property {
    /// The scalar, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Property::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the property, keeping only a scalar.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Property::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The link target. `None` for an unset link and for anything that is
    /// not a link.
    pub fn into_object(self) -> Option<Object> {
        match self {
            Property::Object(object) => object,
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<List> {
        match self {
            Property::List(list) => Some(list),
            _ => None,
        }
    }

    /// True for a null scalar or an unset link. Lists are never null.
    pub fn is_null(&self) -> bool {
        matches!(self, Property::Value(Value::Null) | Property::Object(None))
    }
}

/// A value to write into a property.
///
/// Links accept an object, `None`, or a field map or positional list
/// describing a new object. Lists accept a sequence of element inputs.
#[derive(Clone, Debug)]
pub enum Input {
    Value(Value),
    Object(Option<Object>),
    List(Vec<Input>),
    Fields(BTreeMap<String, Input>),
}

impl Input {
    /// Clears an optional scalar or a link, or empties a list.
    pub fn null() -> Self {
        Input::Value(Value::Null)
    }

    /// A field map describing a new object for a link or list element.
    ///
    /// ```ignore
    /// owner.set_value("dog", Input::fields([("name", "Rex")]))?;
    /// ```
    pub fn fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Input>,
    {
        Input::Fields(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// A whole-list assignment.
    pub fn list<V: Into<Input>>(items: impl IntoIterator<Item = V>) -> Self {
        Input::List(items.into_iter().map(Into::into).collect())
    }

    fn kind(&self) -> &'static str {
        match self {
            Input::Value(value) => value.kind(),
            Input::Object(Some(_)) => "object",
            Input::Object(None) => "null",
            Input::List(_) => "list",
            Input::Fields(_) => "field map",
        }
    }
}

macro_rules! input_from_value {
    ($($ty:ty),* $(,)?) => {$(
        impl From<$ty> for Input {
            fn from(value: $ty) -> Self {
                Input::Value(Value::from(value))
            }
        }

        impl From<Option<$ty>> for Input {
            fn from(value: Option<$ty>) -> Self {
                Input::Value(Value::from(value))
            }
        }
    )*};
}

input_from_value!(bool, i8, i16, i32, i64, f32, f64, String, Vec<u8>, DateTime<Utc>, Decimal, ObjectId);

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Value(Value::from(value))
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Value(value)
    }
}

impl From<Object> for Input {
    fn from(object: Object) -> Self {
        Input::Object(Some(object))
    }
}

impl From<&Object> for Input {
    fn from(object: &Object) -> Self {
        Input::Object(Some(object.clone()))
    }
}

impl From<Option<Object>> for Input {
    fn from(object: Option<Object>) -> Self {
        Input::Object(object)
    }
}

impl From<Vec<Input>> for Input {
    fn from(items: Vec<Input>) -> Self {
        Input::List(items)
    }
}

impl From<Vec<Object>> for Input {
    fn from(objects: Vec<Object>) -> Self {
        Input::List(objects.into_iter().map(Input::from).collect())
    }
}

impl From<Vec<Value>> for Input {
    fn from(values: Vec<Value>) -> Self {
        Input::List(values.into_iter().map(Input::Value).collect())
    }
}

impl From<BTreeMap<String, Input>> for Input {
    fn from(fields: BTreeMap<String, Input>) -> Self {
        Input::Fields(fields)
    }
}

impl<K: Into<String>, V: Into<Input>, const N: usize> From<[(K, V); N]> for Input {
    fn from(fields: [(K, V); N]) -> Self {
        Input::fields(fields)
    }
}

/// Conversion from a read [`Property`] into a concrete Rust type.
pub trait FromProperty: Sized {
    fn from_property(property: Property, name: &str) -> Result<Self>;
}

fn scalar_out(property: Property, name: &str, ty: PropertyType) -> Result<Value> {
    match property {
        Property::Value(value) => coerce(value, ty, false).map_err(|e| Error::from_type(name, e)),
        other => Err(Error::mismatch(name, format!("expected a {ty} value, found {}", describe_kind(&other)))),
    }
}

fn describe_kind(property: &Property) -> &'static str {
    match property {
        Property::Value(value) => value.kind(),
        Property::Object(_) => "object",
        Property::List(_) => "list",
        Property::LinkingObjects(_) => "linking objects",
    }
}

macro_rules! from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl FromProperty for $ty {
            fn from_property(property: Property, name: &str) -> Result<Self> {
                match scalar_out(property, name, PropertyType::$variant)? {
                    Value::$variant(value) => Ok(value),
                    other => Err(Error::mismatch(name, format!("unexpected {} value", other.kind()))),
                }
            }
        }

        impl FromProperty for Option<$ty> {
            fn from_property(property: Property, name: &str) -> Result<Self> {
                match property {
                    Property::Value(Value::Null) => Ok(None),
                    other => <$ty>::from_property(other, name).map(Some),
                }
            }
        }
    )*};
}

from_scalar! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<u8> => Binary,
    DateTime<Utc> => Date,
    Decimal => Decimal128,
    ObjectId => ObjectId,
}

impl FromProperty for Property {
    fn from_property(property: Property, _name: &str) -> Result<Self> {
        Ok(property)
    }
}

impl FromProperty for Value {
    fn from_property(property: Property, name: &str) -> Result<Self> {
        match property {
            Property::Value(value) => Ok(value),
            other => Err(Error::mismatch(name, format!("expected a scalar, found {}", describe_kind(&other)))),
        }
    }
}

impl FromProperty for Option<Object> {
    fn from_property(property: Property, name: &str) -> Result<Self> {
        match property {
            Property::Object(object) => Ok(object),
            other => Err(Error::mismatch(name, format!("expected a link, found {}", describe_kind(&other)))),
        }
    }
}

impl FromProperty for List {
    fn from_property(property: Property, name: &str) -> Result<Self> {
        match property {
            Property::List(list) => Ok(list),
            other => Err(Error::mismatch(name, format!("expected a list, found {}", describe_kind(&other)))),
        }
    }
}

impl FromProperty for LinkingObjects {
    fn from_property(property: Property, name: &str) -> Result<Self> {
        match property {
            Property::LinkingObjects(links) => Ok(links),
            other => Err(Error::mismatch(
                name,
                format!("expected linking objects, found {}", describe_kind(&other)),
            )),
        }
    }
}

/// A statically typed property name.
///
/// ```ignore
/// const AGE: Prop<i64> = Prop::new("age");
/// let age = person.get(AGE)?;
/// ```
pub struct Prop<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Prop<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The property name this constant refers to.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Prop<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Prop<T> {}

impl<T> std::fmt::Debug for Prop<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Prop({})", self.name)
    }
}

/// Read/write proxy for one named property, from [`Object::at`].
pub struct Field<'a> {
    object: &'a Object,
    name: String,
}

impl<'a> Field<'a> {
    pub(crate) fn new(object: &'a Object, name: &str) -> Self {
        Self {
            object,
            name: name.to_owned(),
        }
    }

    /// Same as [`Object::value`].
    pub fn get(&self) -> Result<Property> {
        self.object.value(&self.name)
    }

    /// Same as [`Object::value_as`].
    pub fn get_as<T: FromProperty>(&self) -> Result<T> {
        self.object.value_as(&self.name)
    }

    /// Same as [`Object::set_value`]; managed objects need an open write.
    pub fn set(&self, value: impl Into<Input>) -> Result<()> {
        self.object.set_value(&self.name, value)
    }
}

// ---- Dispatch ----

pub(crate) fn property<'s>(schema: &'s SchemaDescriptor, name: &str) -> Result<&'s PropertyDescriptor> {
    schema.lookup(name).ok_or_else(|| Error::NoSuchProperty {
        class: schema.class_name().to_owned(),
        property: name.to_owned(),
    })
}

pub(crate) fn read_only(schema: &SchemaDescriptor, prop: &PropertyDescriptor) -> Error {
    Error::ReadOnlyProperty {
        class: schema.class_name().to_owned(),
        property: prop.name.clone(),
    }
}

pub(crate) fn target_class(prop: &PropertyDescriptor) -> Result<&str> {
    prop.object_class
        .as_deref()
        .ok_or_else(|| Error::mismatch(&prop.name, "relationship has no target class"))
}

pub(crate) fn scalar(name: &str, ty: PropertyType, optional: bool, input: Input) -> Result<Value> {
    match input {
        Input::Value(value) => coerce(value, ty, optional).map_err(|e| Error::from_type(name, e)),
        other => Err(Error::mismatch(name, format!("expected a {ty} value, got {}", other.kind()))),
    }
}

/// Elements of a list assignment. Null clears the list.
pub(crate) fn list_items(prop: &PropertyDescriptor, input: Input) -> Result<Vec<Input>> {
    match input {
        Input::Value(Value::Null) => Ok(Vec::new()),
        Input::List(items) => Ok(items),
        Input::Value(Value::List(values)) => Ok(values.into_iter().map(Input::Value).collect()),
        other => Err(Error::mismatch(&prop.name, format!("expected a list, got {}", other.kind()))),
    }
}

/// Read one property. A managed handle reports thread and invalidation
/// errors before the name is looked up.
pub(crate) fn get(object: &Object, name: &str) -> Result<Property> {
    let binding = {
        let source = object.inner.source.read();
        match &*source {
            Source::Unmanaged(slots) => {
                let prop = property(object.schema(), name)?;
                return Ok(unmanaged_get(object, prop, slots));
            }
            Source::Managed(binding) => binding.clone(),
        }
    };
    managed_get(object, &binding, name)
}

fn unmanaged_get(object: &Object, prop: &PropertyDescriptor, slots: &BTreeMap<String, Slot>) -> Property {
    match prop.property_type {
        PropertyType::LinkingObjects => Property::LinkingObjects(LinkingObjects::new(object.clone(), &prop.name)),
        PropertyType::List => Property::List(List::new(object.clone(), &prop.name)),
        PropertyType::Link => match slots.get(&prop.name) {
            Some(Slot::Link(target)) => Property::Object(target.clone()),
            _ => Property::Object(None),
        },
        _ => match slots.get(&prop.name) {
            Some(Slot::Value(value)) => Property::Value(value.clone()),
            _ => Property::Value(Value::Null),
        },
    }
}

fn managed_get(object: &Object, binding: &Binding, name: &str) -> Result<Property> {
    binding.session.check_thread()?;
    let state = binding
        .session
        .read_row(binding.row)?
        .ok_or(Error::InvalidatedObject)?;
    let prop = property(object.schema(), name)?;
    Ok(match prop.property_type {
        PropertyType::LinkingObjects => Property::LinkingObjects(LinkingObjects::new(object.clone(), &prop.name)),
        PropertyType::List => Property::List(List::new(object.clone(), &prop.name)),
        PropertyType::Link => match state.get(&prop.name) {
            Some(Value::Link(row)) => Property::Object(binding.session.object_at(*row)?),
            _ => Property::Object(None),
        },
        _ => Property::Value(state.get(&prop.name).cloned().unwrap_or(Value::Null)),
    })
}

pub(crate) fn set(object: &Object, name: &str, input: Input) -> Result<()> {
    let schema = Arc::clone(object.schema());
    let prop = property(&schema, name)?;
    if prop.is_linking_objects() {
        return Err(read_only(&schema, prop));
    }
    match object.binding() {
        None => {
            let slot = to_slot(prop, input)?;
            object.store_slots(|slots| {
                slots.insert(prop.name.clone(), slot);
            })
        }
        Some(binding) => {
            if prop.is_primary_key {
                return Err(Error::PrimaryKeyImmutable {
                    class: schema.class_name().to_owned(),
                    property: prop.name.clone(),
                });
            }
            binding
                .session
                .with_txn(|txn| txn.assign(&schema, binding.row, vec![(prop, input)]))
        }
    }
}

/// Assign several properties at once. Either every assignment applies or
/// none does.
pub(crate) fn set_values(object: &Object, input: Input) -> Result<()> {
    let schema = Arc::clone(object.schema());
    let entries = bulk_entries(&schema, input)?;
    for (prop, _) in &entries {
        if prop.is_linking_objects() {
            return Err(read_only(&schema, prop));
        }
    }
    match object.binding() {
        None => {
            let mut converted = Vec::with_capacity(entries.len());
            for (prop, input) in entries {
                converted.push((prop.name.clone(), to_slot(prop, input)?));
            }
            object.store_slots(|slots| slots.extend(converted))
        }
        Some(binding) => {
            if let Some((prop, _)) = entries.iter().find(|(p, _)| p.is_primary_key) {
                return Err(Error::PrimaryKeyImmutable {
                    class: schema.class_name().to_owned(),
                    property: prop.name.clone(),
                });
            }
            binding
                .session
                .with_txn(|txn| txn.assign(&schema, binding.row, entries))
        }
    }
}

/// Pair each input with its property, primary key first.
fn bulk_entries(schema: &SchemaDescriptor, input: Input) -> Result<Vec<(&PropertyDescriptor, Input)>> {
    let mut entries = match input {
        Input::Fields(fields) => fields
            .into_iter()
            .map(|(name, value)| property(schema, &name).map(|prop| (prop, value)))
            .collect::<Result<Vec<_>>>()?,
        Input::List(values) => positional(schema, values)?,
        Input::Value(Value::List(values)) => positional(schema, values.into_iter().map(Input::Value).collect())?,
        other => {
            return Err(Error::InvalidOperation(format!(
                "cannot initialize '{}' from a {}",
                schema.class_name(),
                other.kind()
            )))
        }
    };
    entries.sort_by_key(|(prop, _)| !prop.is_primary_key);
    Ok(entries)
}

/// Values in persisted-property order. Missing trailing values leave
/// their properties alone.
fn positional(schema: &SchemaDescriptor, values: Vec<Input>) -> Result<Vec<(&PropertyDescriptor, Input)>> {
    let props: Vec<&PropertyDescriptor> = schema.persisted_properties().collect();
    if values.len() > props.len() {
        return Err(Error::InvalidOperation(format!(
            "{} values given for the {} properties of '{}'",
            values.len(),
            props.len(),
            schema.class_name()
        )));
    }
    Ok(props.into_iter().zip(values).collect())
}

fn to_slot(prop: &PropertyDescriptor, input: Input) -> Result<Slot> {
    match prop.property_type {
        PropertyType::Link => to_link(prop, input).map(Slot::Link),
        PropertyType::List => {
            let items = list_items(prop, input)?;
            let mut converted = Vec::with_capacity(items.len());
            for item in items {
                converted.push(to_item(prop, item)?);
            }
            Ok(Slot::List(converted))
        }
        ty => scalar(&prop.name, ty, prop.is_optional, input).map(Slot::Value),
    }
}

fn to_link(prop: &PropertyDescriptor, input: Input) -> Result<Option<Object>> {
    let target = target_class(prop)?;
    match input {
        Input::Value(Value::Null) | Input::Object(None) => Ok(None),
        Input::Object(Some(object)) => {
            if object.class_name() != target {
                return Err(Error::mismatch(
                    &prop.name,
                    format!("expected an object of class '{target}', got '{}'", object.class_name()),
                ));
            }
            Ok(Some(object))
        }
        nested @ (Input::Fields(_) | Input::List(_)) => {
            let schema = class_schema(target).ok_or_else(|| Error::ClassNotFound(target.to_owned()))?;
            Object::with_values(schema, nested).map(Some)
        }
        Input::Value(other) => Err(Error::mismatch(
            &prop.name,
            format!("expected an object of class '{target}', got {}", other.kind()),
        )),
    }
}

fn to_item(prop: &PropertyDescriptor, input: Input) -> Result<Item> {
    match prop.element_type {
        Some(PropertyType::Link) => match to_link(prop, input)? {
            Some(object) => Ok(Item::Object(object)),
            None => Err(Error::mismatch(&prop.name, "list elements cannot be null")),
        },
        Some(element) => scalar(&prop.name, element, prop.is_optional, input).map(Item::Value),
        None => Err(Error::mismatch(&prop.name, "list has no element type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{all_types_schema, bool_schema, person_schema, test_database};

    const INT_COL: Prop<i64> = Prop::new("intCol");
    const OPT_INT: Prop<Option<i64>> = Prop::new("optIntCol");

    fn unmanaged() -> Object {
        Object::new(all_types_schema())
    }

    // ---- Unmanaged ----

    #[test]
    fn initial_values() {
        let obj = unmanaged();
        assert!(!obj.value_as::<bool>("boolCol").unwrap());
        assert_eq!(obj.get(INT_COL).unwrap(), 0);
        assert_eq!(obj.get(OPT_INT).unwrap(), None);
        assert_eq!(obj.value_as::<String>("stringCol").unwrap(), "");
        assert!(obj.value("objectCol").unwrap().is_null());
        assert_eq!(obj.list("arrayCol").unwrap().len().unwrap(), 0);
    }

    #[test]
    fn set_and_get_round_trip() {
        let obj = unmanaged();
        obj.set(INT_COL, 7).unwrap();
        obj.set_value("stringCol", "hello").unwrap();
        obj.set(OPT_INT, Some(3)).unwrap();
        assert_eq!(obj.get(INT_COL).unwrap(), 7);
        assert_eq!(obj.value_as::<String>("stringCol").unwrap(), "hello");
        assert_eq!(obj.get(OPT_INT).unwrap(), Some(3));
        obj.set(OPT_INT, None).unwrap();
        assert_eq!(obj.get(OPT_INT).unwrap(), None);
    }

    #[test]
    fn integer_widths_are_coerced() {
        let obj = unmanaged();
        obj.set_value("int8Col", 5i64).unwrap();
        assert_eq!(obj.value("int8Col").unwrap(), Property::Value(Value::Int8(5)));
        let err = obj.set_value("int8Col", 500i64).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref property, .. } if property == "int8Col"));
    }

    #[test]
    fn null_rejected_for_required() {
        let obj = unmanaged();
        let err = obj.set_value("intCol", Input::null()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn unknown_property() {
        let obj = unmanaged();
        assert!(matches!(obj.value("nope"), Err(Error::NoSuchProperty { .. })));
        assert!(matches!(obj.set_value("nope", 1), Err(Error::NoSuchProperty { .. })));
    }

    #[test]
    fn links_check_class() {
        let obj = unmanaged();
        let other = Object::new(person_schema());
        let err = obj.set_value("objectCol", &other).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        let target = Object::new(bool_schema());
        obj.set_value("objectCol", &target).unwrap();
        assert_eq!(obj.value("objectCol").unwrap().into_object().unwrap(), target);
    }

    #[test]
    fn nested_fields_create_targets() {
        let obj = unmanaged();
        obj.set_value("objectCol", [("boolCol", true)]).unwrap();
        let target = obj.value("objectCol").unwrap().into_object().unwrap();
        assert!(!target.is_managed());
        assert!(target.value_as::<bool>("boolCol").unwrap());
    }

    #[test]
    fn bulk_assignment_is_all_or_nothing() {
        let obj = unmanaged();
        let err = obj
            .set_values([("intCol", Input::from(9i64)), ("int8Col", Input::from(1000i64))])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(obj.get(INT_COL).unwrap(), 0);

        obj.set_values([("intCol", Input::from(9i64)), ("int8Col", Input::from(10i64))]).unwrap();
        assert_eq!(obj.get(INT_COL).unwrap(), 9);
    }

    #[test]
    fn positional_values() {
        let obj = Object::with_values(bool_schema(), Input::list([true])).unwrap();
        assert!(obj.value_as::<bool>("boolCol").unwrap());
        let err = Object::with_values(bool_schema(), Input::list([true, false])).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn linking_objects_are_read_only() {
        let dog = Object::new(crate::testing::dog_schema());
        assert!(matches!(dog.set_value("owners", Input::null()), Err(Error::ReadOnlyProperty { .. })));
        assert!(dog.linking_objects("owners").unwrap().to_vec().unwrap().is_empty());
    }

    #[test]
    fn field_proxy() {
        let obj = unmanaged();
        obj.at("intCol").set(4).unwrap();
        assert_eq!(obj.at("intCol").get_as::<i64>().unwrap(), 4);
        assert!(matches!(obj.at("missing").get(), Err(Error::NoSuchProperty { .. })));
    }

    // ---- Managed ----

    #[test]
    fn managed_write_requires_transaction() {
        let db = test_database();
        let session = db.session().unwrap();
        session.begin_write().unwrap();
        let obj = session.create("AllTypes", Input::Fields(BTreeMap::new())).unwrap();
        session.commit_write().unwrap();

        assert!(matches!(obj.set(INT_COL, 1), Err(Error::NotInWriteTransaction)));
        session.write(|_| obj.set(INT_COL, 2)).unwrap();
        assert_eq!(obj.get(INT_COL).unwrap(), 2);
    }

    #[test]
    fn primary_key_is_immutable_once_managed() {
        let db = test_database();
        let session = db.session().unwrap();
        let person = session.write(|s| s.create("Person", [("name", "Ann")])).unwrap();
        session.begin_write().unwrap();
        assert!(matches!(
            person.set_value("name", "Bea"),
            Err(Error::PrimaryKeyImmutable { .. })
        ));
        assert!(matches!(
            person.set_values([("name", Input::from("Bea")), ("age", Input::from(3i64))]),
            Err(Error::PrimaryKeyImmutable { .. })
        ));
        session.cancel_write().unwrap();
    }

    #[test]
    fn failed_bulk_assignment_leaves_row_untouched() {
        let db = test_database();
        let session = db.session().unwrap();
        let obj = session.write(|s| s.create("AllTypes", [("intCol", 1i64)])).unwrap();
        session.begin_write().unwrap();
        let err = obj
            .set_values([("intCol", Input::from(5i64)), ("int16Col", Input::from(1i64 << 40))])
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(obj.get(INT_COL).unwrap(), 1);
        session.commit_write().unwrap();
        assert_eq!(obj.get(INT_COL).unwrap(), 1);
    }

    #[test]
    fn managed_links_resolve_to_managed_objects() {
        let db = test_database();
        let session = db.session().unwrap();
        let obj = session
            .write(|s| s.create("AllTypes", [("objectCol", Input::fields([("boolCol", true)]))]))
            .unwrap();
        let target = obj.value("objectCol").unwrap().into_object().unwrap();
        assert!(target.is_managed());
        assert!(target.value_as::<bool>("boolCol").unwrap());

        session.write(|_| obj.set_value("objectCol", Input::null())).unwrap();
        assert!(obj.value("objectCol").unwrap().is_null());
        assert_eq!(session.objects("BoolObject").unwrap().len(), 1);
    }

    #[test]
    fn invalidation_is_reported_before_unknown_names() {
        let db = test_database();
        let session = db.session().unwrap();
        let obj = session.write(|s| s.create("BoolObject", [("boolCol", true)])).unwrap();
        session.write(|s| s.delete(&obj)).unwrap();
        assert!(matches!(obj.value("nope"), Err(Error::InvalidatedObject)));
        assert!(matches!(obj.value("boolCol"), Err(Error::InvalidatedObject)));

        let live = session.write(|s| s.create("BoolObject", [("boolCol", true)])).unwrap();
        let result = std::thread::spawn(move || live.value("nope").map(|_| ()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(Error::WrongThread)));
    }
}
