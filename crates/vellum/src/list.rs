use std::fmt;

use vellum_notify::{ObjectChange, ObserverToken};
use vellum_schema::PropertyDescriptor;
use vellum_types::{PropertyType, Value};

use crate::accessor::{Input, Property};
use crate::error::{Error, Result};
use crate::object::{Binding, Item, Object, Slot, Source};

/// A list property of one object.
///
/// The list reads through its owner, so it always shows the owner's
/// current contents. Mutations replace the whole list in a single
/// assignment and follow the owner's write rules.
#[derive(Clone)]
pub struct List {
    owner: Object,
    property: String,
}

impl List {
    pub(crate) fn new(owner: Object, property: &str) -> Self {
        Self {
            owner,
            property: property.to_owned(),
        }
    }

    /// The object holding this list.
    pub fn owner(&self) -> &Object {
        &self.owner
    }

    pub fn property_name(&self) -> &str {
        &self.property
    }

    fn descriptor(&self) -> Option<&PropertyDescriptor> {
        self.owner.schema().lookup(&self.property)
    }

    /// Type of the elements, `Link` for a list of objects.
    pub fn element_type(&self) -> Option<PropertyType> {
        self.descriptor().and_then(|p| p.element_type)
    }

    /// True when the owner is a frozen snapshot.
    pub fn is_frozen(&self) -> bool {
        self.owner.is_frozen()
    }

    /// Current elements. Link elements read as [`Property::Object`].
    pub fn to_vec(&self) -> Result<Vec<Property>> {
        let binding = {
            let source = self.owner.inner.source.read();
            match &*source {
                Source::Unmanaged(slots) => {
                    return Ok(match slots.get(&self.property) {
                        Some(Slot::List(items)) => items
                            .iter()
                            .map(|item| match item {
                                Item::Value(value) => Property::Value(value.clone()),
                                Item::Object(object) => Property::Object(Some(object.clone())),
                            })
                            .collect(),
                        _ => Vec::new(),
                    })
                }
                Source::Managed(binding) => binding.clone(),
            }
        };
        self.stored(&binding)
    }

    fn stored(&self, binding: &Binding) -> Result<Vec<Property>> {
        binding.session.check_thread()?;
        let state = binding
            .session
            .read_row(binding.row)?
            .ok_or(Error::InvalidatedObject)?;
        match state.get(&self.property) {
            Some(Value::List(values)) => values
                .iter()
                .map(|value| match value {
                    Value::Link(row) => binding.session.object_at(*row).map(Property::Object),
                    other => Ok(Property::Value(other.clone())),
                })
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.to_vec()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The element at `index`, or `IndexOutOfBounds`.
    pub fn get(&self, index: usize) -> Result<Property> {
        let mut items = self.to_vec()?;
        let len = items.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        Ok(items.swap_remove(index))
    }

    /// Elements of a scalar list.
    pub fn values(&self) -> Result<Vec<Value>> {
        self.to_vec()?
            .into_iter()
            .map(|item| match item {
                Property::Value(value) => Ok(value),
                _ => Err(Error::mismatch(&self.property, "not a list of values")),
            })
            .collect()
    }

    /// Elements of a list of objects.
    pub fn objects(&self) -> Result<Vec<Object>> {
        self.to_vec()?
            .into_iter()
            .filter_map(|item| match item {
                Property::Object(Some(object)) => Some(Ok(object)),
                Property::Object(None) => None,
                _ => Some(Err(Error::mismatch(&self.property, "not a list of objects"))),
            })
            .collect()
    }

    // ---- Mutation ----

    fn inputs(&self) -> Result<Vec<Input>> {
        Ok(self
            .to_vec()?
            .into_iter()
            .map(|item| match item {
                Property::Value(value) => Input::Value(value),
                Property::Object(object) => Input::Object(object),
                Property::List(_) | Property::LinkingObjects(_) => Input::Value(Value::Null),
            })
            .collect())
    }

    fn assign(&self, items: Vec<Input>) -> Result<()> {
        self.owner.set_value(&self.property, Input::List(items))
    }

    /// Append one element.
    ///
    /// Each mutation below rewrites the whole list through the owner, so on
    /// a managed owner it needs an open write and commits with it.
    pub fn push(&self, value: impl Into<Input>) -> Result<()> {
        let mut items = self.inputs()?;
        items.push(value.into());
        self.assign(items)
    }

    /// Insert before `index`. `index == len` appends.
    pub fn insert(&self, index: usize, value: impl Into<Input>) -> Result<()> {
        let mut items = self.inputs()?;
        if index > items.len() {
            return Err(Error::IndexOutOfBounds { index, len: items.len() });
        }
        items.insert(index, value.into());
        self.assign(items)
    }

    /// Overwrite the element at `index`.
    pub fn set(&self, index: usize, value: impl Into<Input>) -> Result<()> {
        let mut items = self.inputs()?;
        let len = items.len();
        let slot = items.get_mut(index).ok_or(Error::IndexOutOfBounds { index, len })?;
        *slot = value.into();
        self.assign(items)
    }

    /// Remove the element at `index`. Removed objects stay in the store.
    pub fn remove(&self, index: usize) -> Result<()> {
        let mut items = self.inputs()?;
        if index >= items.len() {
            return Err(Error::IndexOutOfBounds { index, len: items.len() });
        }
        items.remove(index);
        self.assign(items)
    }

    /// Remove every element.
    pub fn clear(&self) -> Result<()> {
        self.assign(Vec::new())
    }

    /// Replace every element.
    pub fn replace_all<V: Into<Input>>(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        self.assign(values.into_iter().map(Into::into).collect())
    }

    // ---- Freezing and observation ----

    /// The same list on a frozen copy of the owner.
    pub fn freeze(&self) -> Result<List> {
        Ok(List::new(self.owner.freeze()?, &self.property))
    }

    /// The same list on the live owner, or `None` if the owner was deleted.
    /// See [`Object::thaw`].
    pub fn thaw(&self) -> Result<Option<List>> {
        Ok(self.owner.thaw()?.map(|owner| List::new(owner, &self.property)))
    }

    /// Observe changes to this list, including changes to the objects it
    /// holds.
    pub fn observe<F>(&self, callback: F) -> Result<ObserverToken>
    where
        F: FnMut(ObjectChange) + Send + 'static,
    {
        self.owner.observe_key_paths(&[self.property.as_str()], callback)
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.property == other.property && self.owner == other.owner
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("class", &self.owner.class_name())
            .field("property", &self.property)
            .finish()
    }
}

/// Objects whose relationship property points at the owner.
///
/// Computed on every read; unmanaged owners have none.
#[derive(Clone)]
pub struct LinkingObjects {
    owner: Object,
    property: String,
}

impl LinkingObjects {
    pub(crate) fn new(owner: Object, property: &str) -> Self {
        Self {
            owner,
            property: property.to_owned(),
        }
    }

    /// The object being linked to.
    pub fn owner(&self) -> &Object {
        &self.owner
    }

    /// Name of the linking-objects property on the owner's class.
    pub fn property_name(&self) -> &str {
        &self.property
    }

    /// Class and property the links come from.
    pub fn origin(&self) -> Option<(&str, &str)> {
        let prop = self.owner.schema().lookup(&self.property)?;
        Some((prop.object_class.as_deref()?, prop.origin_property.as_deref()?))
    }

    /// Every object currently linking to the owner, in row order. Each
    /// one appears once even if it links more than once.
    pub fn to_vec(&self) -> Result<Vec<Object>> {
        let Some(binding) = self.owner.binding() else {
            return Ok(Vec::new());
        };
        let Some((origin_class, origin_property)) = self.origin() else {
            return Ok(Vec::new());
        };
        binding.session.check_thread()?;
        if binding.session.read_row(binding.row)?.is_none() {
            return Err(Error::InvalidatedObject);
        }
        let Some(table) = binding.session.table_for(origin_class) else {
            return Ok(Vec::new());
        };
        let schema = binding.session.schema(origin_class)?;
        let target = Value::Link(binding.row);
        let mut found = Vec::new();
        for row in binding.session.rows(table)? {
            let Some(state) = binding.session.read_row(row)? else {
                continue;
            };
            let links_here = match state.get(origin_property) {
                Some(Value::List(items)) => items.contains(&target),
                Some(value) => *value == target,
                None => false,
            };
            if links_here {
                found.push(binding.session.bind_with(std::sync::Arc::clone(&schema), row, &state));
            }
        }
        Ok(found)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.to_vec()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The linking object at `index`, or `IndexOutOfBounds`.
    pub fn get(&self, index: usize) -> Result<Object> {
        let mut objects = self.to_vec()?;
        let len = objects.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        Ok(objects.swap_remove(index))
    }
}

impl PartialEq for LinkingObjects {
    fn eq(&self, other: &Self) -> bool {
        self.property == other.property && self.owner == other.owner
    }
}

impl fmt::Debug for LinkingObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkingObjects")
            .field("class", &self.owner.class_name())
            .field("property", &self.property)
            .finish()
    }
}
