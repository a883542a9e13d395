use std::collections::BTreeMap;
use std::sync::Arc;

use vellum_types::PropertyType;

use crate::error::{SchemaError, SchemaResult};
use crate::schema::SchemaDescriptor;

/// The classes known to one database, keyed by class name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaSet {
    classes: BTreeMap<String, Arc<SchemaDescriptor>>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from descriptors, rejecting duplicate class names.
    pub fn from_schemas(
        schemas: impl IntoIterator<Item = Arc<SchemaDescriptor>>,
    ) -> SchemaResult<Self> {
        let mut set = Self::new();
        for schema in schemas {
            set.insert(schema)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, schema: Arc<SchemaDescriptor>) -> SchemaResult<()> {
        let name = schema.class_name().to_owned();
        if self.classes.contains_key(&name) {
            return Err(SchemaError::DuplicateClass(name));
        }
        self.classes.insert(name, schema);
        Ok(())
    }

    pub fn get(&self, class_name: &str) -> Option<&Arc<SchemaDescriptor>> {
        self.classes.get(class_name)
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SchemaDescriptor>> {
        self.classes.values()
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Check cross-class references: every relationship targets a class in
    /// the set, and every linking-objects property inverts a link (or link
    /// list) that points back at its own class.
    pub fn validate(&self) -> SchemaResult<()> {
        for schema in self.classes.values() {
            for prop in schema.properties() {
                let Some(target) = prop.object_class.as_deref() else {
                    continue;
                };
                let Some(target_schema) = self.classes.get(target) else {
                    return Err(SchemaError::UnknownTargetClass {
                        class: schema.class_name().to_owned(),
                        property: prop.name.clone(),
                        target: target.to_owned(),
                    });
                };
                if prop.property_type != PropertyType::LinkingObjects {
                    continue;
                }
                let origin = prop.origin_property.as_deref().unwrap_or_default();
                let valid = target_schema.lookup(origin).is_some_and(|o| {
                    o.is_relationship() && o.object_class.as_deref() == Some(schema.class_name())
                });
                if !valid {
                    return Err(SchemaError::InvalidOrigin {
                        class: schema.class_name().to_owned(),
                        property: prop.name.clone(),
                        origin_class: target.to_owned(),
                        origin_property: origin.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }
}
