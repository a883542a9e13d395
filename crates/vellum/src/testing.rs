//! Schemas and databases shared by the unit tests.

use std::sync::Arc;

use vellum_schema::{PropertyDescriptor, SchemaDescriptor};
use vellum_types::PropertyType;

use crate::config::Configuration;
use crate::database::Database;

fn build(builder: vellum_schema::SchemaBuilder) -> Arc<SchemaDescriptor> {
    Arc::new(builder.build().expect("fixture schema is valid"))
}

pub(crate) fn bool_schema() -> Arc<SchemaDescriptor> {
    build(SchemaDescriptor::builder("BoolObject").property(PropertyDescriptor::new("boolCol", PropertyType::Bool)))
}

pub(crate) fn all_types_schema() -> Arc<SchemaDescriptor> {
    build(
        SchemaDescriptor::builder("AllTypes")
            .property(PropertyDescriptor::new("boolCol", PropertyType::Bool))
            .property(PropertyDescriptor::new("intCol", PropertyType::Int64))
            .property(PropertyDescriptor::new("int8Col", PropertyType::Int8))
            .property(PropertyDescriptor::new("int16Col", PropertyType::Int16))
            .property(PropertyDescriptor::new("int32Col", PropertyType::Int32))
            .property(PropertyDescriptor::new("floatCol", PropertyType::Float))
            .property(PropertyDescriptor::new("doubleCol", PropertyType::Double))
            .property(PropertyDescriptor::new("stringCol", PropertyType::String))
            .property(PropertyDescriptor::new("binaryCol", PropertyType::Binary))
            .property(PropertyDescriptor::new("dateCol", PropertyType::Date))
            .property(PropertyDescriptor::new("decimalCol", PropertyType::Decimal128))
            .property(PropertyDescriptor::new("objectIdCol", PropertyType::ObjectId))
            .property(PropertyDescriptor::new("optIntCol", PropertyType::Int64).optional())
            .property(PropertyDescriptor::new("optStringCol", PropertyType::String).optional())
            .property(PropertyDescriptor::link("objectCol", "BoolObject"))
            .property(PropertyDescriptor::object_list("arrayCol", "BoolObject"))
            .property(PropertyDescriptor::list("intArray", PropertyType::Int64)),
    )
}

pub(crate) fn person_schema() -> Arc<SchemaDescriptor> {
    build(
        SchemaDescriptor::builder("Person")
            .property(PropertyDescriptor::new("name", PropertyType::String).primary_key())
            .property(PropertyDescriptor::new("age", PropertyType::Int64))
            .property(PropertyDescriptor::object_list("dogs", "Dog")),
    )
}

pub(crate) fn dog_schema() -> Arc<SchemaDescriptor> {
    build(
        SchemaDescriptor::builder("Dog")
            .property(PropertyDescriptor::new("name", PropertyType::String))
            .property(PropertyDescriptor::linking_objects("owners", "Person", "dogs")),
    )
}

pub(crate) fn test_database() -> Database {
    Database::open(
        Configuration::default(),
        [all_types_schema(), bool_schema(), person_schema(), dog_schema()],
    )
    .expect("fixture database opens")
}
