use vellum_types::{PropertyType, TypeError};

/// Errors raised while building or validating schemas.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    /// More than one property was declared as the primary key.
    #[error("class '{class}' declares more than one primary key ('{first}' and '{second}')")]
    MultiplePrimaryKeys {
        class: String,
        first: String,
        second: String,
    },

    /// The primary key has a type that cannot be a primary key.
    #[error("property '{class}.{property}' of type {ty} cannot be a primary key")]
    UnsupportedPrimaryKeyType {
        class: String,
        property: String,
        ty: PropertyType,
    },

    /// Two properties share a name.
    #[error("class '{class}' declares property '{property}' more than once")]
    DuplicateProperty { class: String, property: String },

    /// An index was requested on a type that cannot be indexed.
    #[error("property '{class}.{property}' of type {ty} cannot be indexed")]
    UnindexableProperty {
        class: String,
        property: String,
        ty: PropertyType,
    },

    /// A relationship property has no target class.
    #[error("property '{class}.{property}' requires a target class")]
    MissingTarget { class: String, property: String },

    /// A list was declared with an element type that cannot be listed.
    #[error("property '{class}.{property}' cannot hold {element} elements")]
    InvalidListElement {
        class: String,
        property: String,
        element: PropertyType,
    },

    /// A declared default does not fit the property's type.
    #[error("default for '{class}.{property}' is invalid: {source}")]
    InvalidDefault {
        class: String,
        property: String,
        source: TypeError,
    },

    /// A relationship targets a class the schema set does not contain.
    #[error("property '{class}.{property}' links to unknown class '{target}'")]
    UnknownTargetClass {
        class: String,
        property: String,
        target: String,
    },

    /// A linking-objects property names an origin that is not a link back.
    #[error("linking objects '{class}.{property}' has invalid origin '{origin_class}.{origin_property}'")]
    InvalidOrigin {
        class: String,
        property: String,
        origin_class: String,
        origin_property: String,
    },

    /// The same class was added to a schema set twice.
    #[error("class '{0}' is already part of the schema set")]
    DuplicateClass(String),
}

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
