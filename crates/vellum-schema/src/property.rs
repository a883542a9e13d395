use std::fmt;

use vellum_types::{PropertyType, Value};

/// Default value applied to a property when a new object is created.
#[derive(Clone)]
pub enum DefaultValue {
    /// The same value for every object.
    Fixed(Value),
    /// Evaluated once per new object (e.g. a fresh id or timestamp).
    Generated(fn() -> Value),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Fixed(v) => v.clone(),
            DefaultValue::Generated(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            DefaultValue::Generated(_) => f.write_str("Generated"),
        }
    }
}

// Generators are compared by kind only; function pointer identity is not
// stable across codegen units.
impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DefaultValue::Fixed(a), DefaultValue::Fixed(b)) => a == b,
            (DefaultValue::Generated(_), DefaultValue::Generated(_)) => true,
            _ => false,
        }
    }
}

/// Describes one persisted (or computed) property of a class.
///
/// Constructors cover the shapes a property can take; modifiers such as
/// [`optional`](Self::optional) and [`primary_key`](Self::primary_key)
/// refine it. Validation happens when the owning schema is built.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub property_type: PropertyType,
    /// Element tag for `List` properties.
    pub element_type: Option<PropertyType>,
    /// Target class for links, link lists and linking objects.
    pub object_class: Option<String>,
    /// Forward link property inverted by a `LinkingObjects` property.
    pub origin_property: Option<String>,
    /// For lists this applies to the elements.
    pub is_optional: bool,
    pub is_indexed: bool,
    pub is_primary_key: bool,
    pub default: Option<DefaultValue>,
}

impl PropertyDescriptor {
    /// A scalar property.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            element_type: None,
            object_class: None,
            origin_property: None,
            is_optional: false,
            is_indexed: false,
            is_primary_key: false,
            default: None,
        }
    }

    /// A to-one link. Links are always optional.
    pub fn link(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut prop = Self::new(name, PropertyType::Link);
        prop.object_class = Some(target.into());
        prop.is_optional = true;
        prop
    }

    /// A list of scalars.
    pub fn list(name: impl Into<String>, element: PropertyType) -> Self {
        let mut prop = Self::new(name, PropertyType::List);
        prop.element_type = Some(element);
        prop
    }

    /// A list of links to `target`.
    pub fn object_list(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut prop = Self::list(name, PropertyType::Link);
        prop.object_class = Some(target.into());
        prop
    }

    /// The computed inverse of `origin_class.origin_property`.
    pub fn linking_objects(
        name: impl Into<String>,
        origin_class: impl Into<String>,
        origin_property: impl Into<String>,
    ) -> Self {
        let mut prop = Self::new(name, PropertyType::LinkingObjects);
        prop.object_class = Some(origin_class.into());
        prop.origin_property = Some(origin_property.into());
        prop
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.is_indexed = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Fixed(value.into()));
        self
    }

    pub fn with_default_fn(mut self, generator: fn() -> Value) -> Self {
        self.default = Some(DefaultValue::Generated(generator));
        self
    }

    pub fn is_link(&self) -> bool {
        self.property_type == PropertyType::Link
    }

    pub fn is_list(&self) -> bool {
        self.property_type == PropertyType::List
    }

    pub fn is_linking_objects(&self) -> bool {
        self.property_type == PropertyType::LinkingObjects
    }

    /// Whether values of this property live in the row.
    pub fn is_persisted(&self) -> bool {
        !self.is_linking_objects()
    }

    /// Whether this property references rows of another class.
    pub fn is_relationship(&self) -> bool {
        self.is_link() || self.element_type == Some(PropertyType::Link)
    }

    /// Value for a new object: the declared default, else the type's
    /// initial value.
    pub fn initial_value(&self) -> Value {
        match &self.default {
            Some(default) => default.produce(),
            None => Value::initial_for(self.property_type, self.is_optional),
        }
    }

    /// Name of the type for descriptions, e.g. `List<Dog>` or `List<int>`.
    pub fn type_label(&self) -> String {
        match (self.property_type, self.element_type, &self.object_class) {
            (PropertyType::List, Some(PropertyType::Link), Some(class)) => format!("List<{class}>"),
            (PropertyType::List, Some(element), _) => format!("List<{element}>"),
            (_, _, Some(class)) => class.clone(),
            (ty, _, None) => ty.to_string(),
        }
    }
}
