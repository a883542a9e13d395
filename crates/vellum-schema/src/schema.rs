use std::collections::HashMap;

use vellum_types::{coerce, PropertyType, Value};

use crate::error::{SchemaError, SchemaResult};
use crate::property::{DefaultValue, PropertyDescriptor};

/// The ordered property table of one class.
#[derive(Clone, Debug)]
pub struct SchemaDescriptor {
    class_name: String,
    properties: Vec<PropertyDescriptor>,
    ignored: Vec<String>,
    primary_key: Option<usize>,
    by_name: HashMap<String, usize>,
}

impl SchemaDescriptor {
    pub fn builder(class_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(class_name)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Properties in declaration order, excluding ignored ones.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn primary_key_property(&self) -> Option<&PropertyDescriptor> {
        self.primary_key.map(|i| &self.properties[i])
    }

    pub fn ignored_properties(&self) -> &[String] {
        &self.ignored
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored.iter().any(|n| n == name)
    }

    pub fn indexed_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.is_indexed)
    }

    /// Properties whose values live in the row.
    pub fn persisted_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.is_persisted())
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl PartialEq for SchemaDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name
            && self.properties == other.properties
            && self.ignored == other.ignored
    }
}

/// Accumulates property declarations for one class and validates them.
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    class_name: String,
    properties: Vec<PropertyDescriptor>,
    ignored: Vec<String>,
}

impl SchemaBuilder {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            properties: Vec::new(),
            ignored: Vec::new(),
        }
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Declare a property that exists on the type but is never persisted.
    pub fn ignored(mut self, name: impl Into<String>) -> Self {
        self.ignored.push(name.into());
        self
    }

    /// Validate the declarations and produce the descriptor.
    pub fn build(self) -> SchemaResult<SchemaDescriptor> {
        let class = self.class_name;
        let mut by_name = HashMap::with_capacity(self.properties.len());
        let mut primary_key: Option<usize> = None;

        for (i, prop) in self.properties.iter().enumerate() {
            if by_name.insert(prop.name.clone(), i).is_some() || self.ignored.contains(&prop.name) {
                return Err(SchemaError::DuplicateProperty {
                    class,
                    property: prop.name.clone(),
                });
            }

            if prop.is_primary_key {
                if let Some(first) = primary_key {
                    return Err(SchemaError::MultiplePrimaryKeys {
                        class,
                        first: self.properties[first].name.clone(),
                        second: prop.name.clone(),
                    });
                }
                if !prop.property_type.is_valid_primary_key() {
                    return Err(SchemaError::UnsupportedPrimaryKeyType {
                        class,
                        property: prop.name.clone(),
                        ty: prop.property_type,
                    });
                }
                primary_key = Some(i);
            }

            if prop.is_indexed && !prop.property_type.is_indexable() {
                return Err(SchemaError::UnindexableProperty {
                    class,
                    property: prop.name.clone(),
                    ty: prop.property_type,
                });
            }

            check_shape(&class, prop)?;
        }

        let mut seen_ignored = Vec::with_capacity(self.ignored.len());
        for name in &self.ignored {
            if seen_ignored.contains(&name) {
                return Err(SchemaError::DuplicateProperty {
                    class,
                    property: name.clone(),
                });
            }
            seen_ignored.push(name);
        }

        Ok(SchemaDescriptor {
            class_name: class,
            properties: self.properties,
            ignored: self.ignored,
            primary_key,
            by_name,
        })
    }
}

/// Per-property checks that do not depend on other properties.
fn check_shape(class: &str, prop: &PropertyDescriptor) -> SchemaResult<()> {
    match prop.property_type {
        PropertyType::Link | PropertyType::LinkingObjects if prop.object_class.is_none() => {
            return Err(SchemaError::MissingTarget {
                class: class.to_owned(),
                property: prop.name.clone(),
            });
        }
        PropertyType::LinkingObjects if prop.origin_property.is_none() => {
            return Err(SchemaError::MissingTarget {
                class: class.to_owned(),
                property: prop.name.clone(),
            });
        }
        PropertyType::List => match prop.element_type {
            Some(PropertyType::Link) if prop.object_class.is_none() => {
                return Err(SchemaError::MissingTarget {
                    class: class.to_owned(),
                    property: prop.name.clone(),
                });
            }
            Some(element) if element.is_scalar() || element == PropertyType::Link => {}
            other => {
                return Err(SchemaError::InvalidListElement {
                    class: class.to_owned(),
                    property: prop.name.clone(),
                    element: other.unwrap_or(PropertyType::List),
                });
            }
        },
        _ => {}
    }

    if let Some(DefaultValue::Fixed(value)) = &prop.default {
        check_default(prop, value).map_err(|source| SchemaError::InvalidDefault {
            class: class.to_owned(),
            property: prop.name.clone(),
            source,
        })?;
    }
    Ok(())
}

fn check_default(prop: &PropertyDescriptor, value: &Value) -> Result<(), vellum_types::TypeError> {
    if prop.property_type.is_scalar() {
        coerce(value.clone(), prop.property_type, prop.is_optional).map(|_| ())
    } else if let (Some(element), Value::List(items)) = (prop.element_type, value) {
        if !element.is_scalar() {
            return Err(vellum_types::TypeError::NotScalar(element));
        }
        for item in items {
            coerce(item.clone(), element, prop.is_optional)?;
        }
        Ok(())
    } else {
        Err(vellum_types::TypeError::NotScalar(prop.property_type))
    }
}
