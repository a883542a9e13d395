use std::sync::Arc;

use tracing::trace;
use vellum_schema::{PropertyDescriptor, SchemaDescriptor};
use vellum_store::{RowState, WriteBatch};
use vellum_types::{PrimaryKey, PropertyType, RowRef, TableId, Value};

use crate::accessor::{list_items, read_only, scalar, target_class, Input};
use crate::error::{Error, Result};
use crate::object::{Binding, Item, Object, Slot};
use crate::session::{overlay, Session};

/// An object given a row during a write, switched to managed once the
/// write step succeeds.
pub(crate) struct PendingAttach {
    object: Object,
    row: RowRef,
    primary_key: Option<PrimaryKey>,
}

impl PendingAttach {
    pub(crate) fn finish(self, session: &Session) {
        self.object.manage(Binding {
            session: session.clone(),
            row: self.row,
            primary_key: self.primary_key,
        });
    }
}

/// One step of an open write: reads see the batch, writes go into it.
///
/// The session's state lock is held for the life of a `Txn`, so nothing
/// here may call back into session methods that read rows.
pub(crate) struct Txn<'a> {
    session: &'a Session,
    batch: &'a mut WriteBatch,
    pending: Vec<PendingAttach>,
}

impl<'a> Txn<'a> {
    pub(crate) fn new(session: &'a Session, batch: &'a mut WriteBatch) -> Self {
        Self {
            session,
            batch,
            pending: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (&'a mut WriteBatch, Vec<PendingAttach>) {
        (self.batch, self.pending)
    }

    pub(crate) fn read_row(&self, row: RowRef) -> Result<Option<Arc<RowState>>> {
        match self.batch.get(row) {
            Some(staged) => Ok(staged),
            None => Ok(self.session.shared.db.store.read_row(row, self.batch.base())?),
        }
    }

    pub(crate) fn rows(&self, table: TableId) -> Result<Vec<RowRef>> {
        let base = self
            .session
            .shared
            .db
            .store
            .enumerate_rows(table, self.batch.base())?;
        Ok(overlay(base, self.batch, table))
    }

    pub(crate) fn put_row(&mut self, row: RowRef, state: RowState) {
        self.batch.put_row(row, state);
    }

    pub(crate) fn delete_row(&mut self, row: RowRef) {
        self.batch.delete_row(row);
    }

    /// Write `entries` into the existing row.
    pub(crate) fn assign(
        &mut self,
        schema: &SchemaDescriptor,
        row: RowRef,
        entries: Vec<(&PropertyDescriptor, Input)>,
    ) -> Result<()> {
        let current = self.read_row(row)?.ok_or(Error::InvalidatedObject)?;
        let mut state = (*current).clone();
        for (prop, input) in entries {
            let value = self.convert(schema, prop, input)?;
            state.insert(prop.name.clone(), value);
        }
        self.batch.put_row(row, state);
        Ok(())
    }

    /// Turn `input` into the value stored for `prop`, attaching any
    /// unmanaged objects it reaches.
    pub(crate) fn convert(
        &mut self,
        schema: &SchemaDescriptor,
        prop: &PropertyDescriptor,
        input: Input,
    ) -> Result<Value> {
        match prop.property_type {
            PropertyType::LinkingObjects => Err(read_only(schema, prop)),
            PropertyType::Link => self.convert_link(prop, input),
            PropertyType::List => {
                let items = list_items(prop, input)?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.convert_element(prop, item)?);
                }
                Ok(Value::List(values))
            }
            ty => scalar(&prop.name, ty, prop.is_optional, input),
        }
    }

    fn convert_element(&mut self, prop: &PropertyDescriptor, item: Input) -> Result<Value> {
        match prop.element_type {
            Some(PropertyType::Link) => match item {
                Input::Value(Value::Null) | Input::Object(None) => {
                    Err(Error::mismatch(&prop.name, "list elements cannot be null"))
                }
                other => self.convert_link(prop, other),
            },
            Some(element) => scalar(&prop.name, element, prop.is_optional, item),
            None => Err(Error::mismatch(&prop.name, "list has no element type")),
        }
    }

    fn convert_link(&mut self, prop: &PropertyDescriptor, input: Input) -> Result<Value> {
        let target = target_class(prop)?;
        match input {
            Input::Value(Value::Null) | Input::Object(None) => Ok(Value::Null),
            Input::Value(Value::Link(row)) => {
                let class = self.session.shared.db.store.table_name(row.table);
                if class.as_deref() != Some(target) {
                    return Err(Error::mismatch(
                        &prop.name,
                        format!("row {row} is not an object of class '{target}'"),
                    ));
                }
                if self.read_row(row)?.is_none() {
                    return Err(Error::InvalidatedObject);
                }
                Ok(Value::Link(row))
            }
            Input::Object(Some(object)) => self.link_to(prop, target, &object).map(Value::Link),
            nested @ (Input::Fields(_) | Input::List(_)) => {
                let object = Object::with_values(self.session.schema(target)?, nested)?;
                self.attach(&object).map(Value::Link)
            }
            Input::Value(other) => Err(Error::mismatch(
                &prop.name,
                format!("expected an object of class '{target}', got {}", other.kind()),
            )),
        }
    }

    fn link_to(&mut self, prop: &PropertyDescriptor, target: &str, object: &Object) -> Result<RowRef> {
        if object.class_name() != target {
            return Err(Error::mismatch(
                &prop.name,
                format!("expected an object of class '{target}', got '{}'", object.class_name()),
            ));
        }
        match object.binding() {
            None => self.attach(object),
            Some(binding) => {
                self.session.check_same(&binding.session)?;
                if self.read_row(binding.row)?.is_none() {
                    return Err(Error::InvalidatedObject);
                }
                Ok(binding.row)
            }
        }
    }

    /// Give an unmanaged object a row, following its links and lists.
    ///
    /// The object is recorded as pending before its relationships are
    /// converted, so cycles between unmanaged objects resolve to the same
    /// row.
    pub(crate) fn attach(&mut self, object: &Object) -> Result<RowRef> {
        if let Some(pending) = self.pending.iter().find(|p| p.object.ptr_eq(object)) {
            return Ok(pending.row);
        }
        let slots = match object.unmanaged_slots() {
            Some(slots) => slots,
            None => {
                let binding = object.binding().ok_or(Error::InvalidatedObject)?;
                self.session.check_same(&binding.session)?;
                return Ok(binding.row);
            }
        };

        let schema = Arc::clone(object.schema());
        let class = schema.class_name();
        if !self.session.schemas().contains(class) {
            return Err(Error::ClassNotFound(class.to_owned()));
        }
        let table = self
            .session
            .table_for(class)
            .ok_or_else(|| Error::ClassNotFound(class.to_owned()))?;

        let primary_key = match schema.primary_key_property() {
            Some(pk) => {
                let value = match slots.get(&pk.name) {
                    Some(Slot::Value(value)) => value.clone(),
                    _ => pk.initial_value(),
                };
                let key = PrimaryKey::from_value(&value).unwrap_or(PrimaryKey::Null);
                let pending_clash = self
                    .pending
                    .iter()
                    .any(|p| p.object.class_name() == class && p.primary_key.as_ref() == Some(&key));
                if pending_clash || self.find_primary_key(table, &pk.name, &key)?.is_some() {
                    return Err(Error::DuplicatePrimaryKey {
                        class: class.to_owned(),
                        key: key.to_string(),
                    });
                }
                Some(key)
            }
            None => None,
        };

        let row = self.session.shared.db.store.allocate_row(table)?;
        self.pending.push(PendingAttach {
            object: object.clone(),
            row,
            primary_key,
        });

        let mut state = RowState::new();
        for prop in schema.persisted_properties() {
            let value = match slots.get(&prop.name) {
                None => prop.initial_value(),
                Some(Slot::Value(value)) => value.clone(),
                Some(Slot::Link(None)) => Value::Null,
                Some(Slot::Link(Some(target))) => {
                    Value::Link(self.link_to(prop, target_class(prop)?, target)?)
                }
                Some(Slot::List(items)) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(match item {
                            Item::Value(value) => value.clone(),
                            Item::Object(target) => {
                                Value::Link(self.link_to(prop, target_class(prop)?, target)?)
                            }
                        });
                    }
                    Value::List(values)
                }
            };
            state.insert(prop.name.clone(), value);
        }
        self.batch.put_row(row, state);
        trace!(class, row = %row, "object attached");
        Ok(row)
    }

    fn find_primary_key(&self, table: TableId, property: &str, key: &PrimaryKey) -> Result<Option<RowRef>> {
        for row in self.rows(table)? {
            if let Some(state) = self.read_row(row)? {
                if state.get(property).and_then(PrimaryKey::from_value).as_ref() == Some(key) {
                    return Ok(Some(row));
                }
            }
        }
        Ok(None)
    }

    /// Delete `row`, nulling links to it and dropping list entries that
    /// point at it.
    pub(crate) fn remove(&mut self, row: RowRef) -> Result<()> {
        let class = self
            .session
            .shared
            .db
            .store
            .table_name(row.table)
            .ok_or_else(|| Error::InvalidOperation(format!("row {row} has no table")))?;
        let target = Value::Link(row);
        let schemas = self.session.schemas();
        for schema in schemas.iter() {
            let incoming: Vec<&PropertyDescriptor> = schema
                .persisted_properties()
                .filter(|p| p.is_relationship() && p.object_class.as_deref() == Some(class.as_str()))
                .collect();
            if incoming.is_empty() {
                continue;
            }
            let Some(table) = self.session.table_for(schema.class_name()) else {
                continue;
            };
            for source in self.rows(table)? {
                let Some(state) = self.read_row(source)? else {
                    continue;
                };
                let mut updated: Option<RowState> = None;
                for prop in &incoming {
                    let replacement = match state.get(&prop.name) {
                        Some(value) if *value == target => Some(Value::Null),
                        Some(Value::List(items)) if items.contains(&target) => Some(Value::List(
                            items.iter().filter(|v| **v != target).cloned().collect(),
                        )),
                        _ => None,
                    };
                    if let Some(value) = replacement {
                        updated
                            .get_or_insert_with(|| (*state).clone())
                            .insert(prop.name.clone(), value);
                    }
                }
                if let Some(state) = updated {
                    self.batch.put_row(source, state);
                }
            }
        }
        self.batch.delete_row(row);
        Ok(())
    }
}
