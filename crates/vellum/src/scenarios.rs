//! End-to-end behaviour across sessions, threads and queues.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use vellum_notify::{ObjectChange, ObserverState, PropertyChange};
use vellum_schema::{PropertyDescriptor, SchemaDescriptor};
use vellum_types::{DateTime, Decimal, ObjectId, PropertyType, Value};

use crate::accessor::{Input, Prop};
use crate::config::Configuration;
use crate::database::Database;
use crate::error::Error;
use crate::object::Object;
use crate::testing::{all_types_schema, bool_schema, dog_schema, person_schema, test_database};

const STRING_COL: Prop<String> = Prop::new("stringCol");
const INT_COL: Prop<i64> = Prop::new("intCol");

fn keyed_schema() -> Arc<SchemaDescriptor> {
    Arc::new(
        SchemaDescriptor::builder("Keyed")
            .property(PropertyDescriptor::new("stringCol", PropertyType::String).primary_key())
            .property(PropertyDescriptor::new("intCol", PropertyType::Int64))
            .build()
            .unwrap(),
    )
}

fn keyed_database() -> Database {
    Database::open(Configuration::default(), [keyed_schema()]).unwrap()
}

fn recorder() -> (Arc<Mutex<Vec<ObjectChange>>>, impl FnMut(ObjectChange) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |change| sink.lock().push(change))
}

fn sample_values() -> Vec<(&'static str, Input, Value)> {
    let date = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let decimal = Decimal::new(12345, 2);
    let id = ObjectId::generate();
    vec![
        ("boolCol", true.into(), Value::Bool(true)),
        ("intCol", 7i64.into(), Value::Int64(7)),
        ("int8Col", 8i8.into(), Value::Int8(8)),
        ("int16Col", 16i16.into(), Value::Int16(16)),
        ("int32Col", 32i32.into(), Value::Int32(32)),
        ("floatCol", 1.5f32.into(), Value::Float(1.5)),
        ("doubleCol", 2.25f64.into(), Value::Double(2.25)),
        ("stringCol", "text".into(), Value::String("text".into())),
        ("binaryCol", vec![1u8, 2, 3].into(), Value::Binary(vec![1, 2, 3])),
        ("dateCol", date.into(), Value::Date(date)),
        ("decimalCol", decimal.into(), Value::Decimal128(decimal)),
        ("objectIdCol", id.into(), Value::ObjectId(id)),
        ("optIntCol", Some(3i64).into(), Value::Int64(3)),
        ("optStringCol", Some("opt".to_string()).into(), Value::String("opt".into())),
    ]
}

fn assert_round_trip(obj: &Object) {
    for (name, input, expected) in sample_values() {
        obj.set_value(name, input).unwrap();
        assert_eq!(obj.value(name).unwrap().into_value(), Some(expected.clone()), "{name}");
        assert_eq!(obj.at(name).get().unwrap().into_value(), Some(expected), "{name}");
    }
    assert_eq!(obj.get(INT_COL).unwrap(), 7);
    assert_eq!(obj.get(STRING_COL).unwrap(), "text");
}

// ---- Primary keys ----

#[test]
fn primary_key_is_immutable_through_every_path() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = Object::new(keyed_schema());
    obj.set(STRING_COL, "a".to_string()).unwrap();
    session.write(|s| s.add(&obj)).unwrap();

    session
        .write(|_| {
            assert!(matches!(obj.set(STRING_COL, "b".to_string()), Err(Error::PrimaryKeyImmutable { .. })));
            assert!(matches!(obj.set_value("stringCol", "b"), Err(Error::PrimaryKeyImmutable { .. })));
            assert!(matches!(obj.at("stringCol").set("b"), Err(Error::PrimaryKeyImmutable { .. })));
            assert!(matches!(
                obj.set_values([("stringCol", Input::from("b")), ("intCol", 5i64.into())]),
                Err(Error::PrimaryKeyImmutable { .. })
            ));
            Ok(())
        })
        .unwrap();
    assert_eq!(obj.get(STRING_COL).unwrap(), "a");
    assert_eq!(obj.get(INT_COL).unwrap(), 0);
}

// ---- Accessors ----

#[test]
fn every_type_round_trips_unmanaged() {
    assert_round_trip(&Object::new(all_types_schema()));
}

#[test]
fn every_type_round_trips_managed() {
    let db = test_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("AllTypes", Input::Fields(Default::default()))).unwrap();
    session
        .write(|_| {
            assert_round_trip(&obj);
            Ok(())
        })
        .unwrap();
    assert_eq!(obj.value("decimalCol").unwrap().into_value(), Some(Value::Decimal128(Decimal::new(12345, 2))));
}

#[test]
fn every_type_round_trips_in_migration() {
    let db = test_database();
    let session = db.session().unwrap();
    session.write(|s| s.create("AllTypes", Input::Fields(Default::default()))).unwrap();
    db.migrate(1, [all_types_schema(), bool_schema(), person_schema(), dog_schema()], |migration| {
        migration.enumerate_objects("AllTypes", |_, new| {
            if let Some(new) = new {
                assert_round_trip(new);
            }
            Ok(())
        })
    })
    .unwrap();
}

// ---- Freeze and thaw ----

#[test]
fn freeze_twice_is_idempotent() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session
        .write(|s| s.create("Keyed", [("stringCol", Input::from("a")), ("intCol", 1i64.into())]))
        .unwrap();
    let first = obj.freeze().unwrap();
    let second = first.freeze().unwrap();
    assert_eq!(first, second);
    assert_eq!(second.get(INT_COL).unwrap(), 1);
    assert_eq!(second.get(STRING_COL).unwrap(), "a");
}

#[test]
fn freeze_then_mutate_then_thaw() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session
        .write(|s| s.create("Keyed", [("stringCol", Input::from("a")), ("intCol", 1i64.into())]))
        .unwrap();
    let frozen = obj.freeze().unwrap();
    session.write(|_| obj.set(INT_COL, 2)).unwrap();

    assert_eq!(frozen.get(INT_COL).unwrap(), 1);
    let thawed = frozen.thaw().unwrap().unwrap();
    assert_eq!(thawed.get(INT_COL).unwrap(), 2);
    assert!(thawed.is_same_object(&frozen));
    assert_eq!(frozen.get(INT_COL).unwrap(), 1);
}

#[test]
fn thaw_after_delete_is_none() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("Keyed", [("stringCol", "a")])).unwrap();
    let frozen = obj.freeze().unwrap();
    session.write(|s| s.delete(&obj)).unwrap();

    assert!(obj.is_invalidated());
    assert!(!frozen.is_invalidated());
    assert_eq!(frozen.get(STRING_COL).unwrap(), "a");
    assert!(frozen.thaw().unwrap().is_none());
}

#[test]
fn thaw_sees_every_commit_since_freeze() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("Keyed", [("stringCol", "a")])).unwrap();
    let frozen = obj.freeze().unwrap();

    let writer = db.clone();
    thread::spawn(move || {
        let session = writer.session().unwrap();
        for value in 1..=3i64 {
            session
                .write(|s| {
                    let obj = s.object_for_primary_key("Keyed", "a")?.ok_or(Error::InvalidatedObject)?;
                    obj.set(INT_COL, value)
                })
                .unwrap();
        }
    })
    .join()
    .unwrap();

    // The live session was not refreshed by anyone before thawing.
    assert_eq!(obj.get(INT_COL).unwrap(), 0);
    let thawed = frozen.thaw().unwrap().unwrap();
    assert_eq!(thawed.get(INT_COL).unwrap(), 3);
    assert_eq!(obj.get(INT_COL).unwrap(), 3);
    assert_eq!(frozen.get(INT_COL).unwrap(), 0);
}

#[test]
fn frozen_objects_are_shared_across_threads() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session
        .write(|s| s.create("Keyed", [("stringCol", Input::from("a")), ("intCol", 4i64.into())]))
        .unwrap();
    let frozen = obj.freeze().unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let frozen = frozen.clone();
            thread::spawn(move || frozen.get(INT_COL).unwrap())
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.join().unwrap(), 4);
    }
}

// ---- Notifications ----

#[test]
fn observer_sees_int_change() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session
        .write(|s| s.create("Keyed", [("stringCol", Input::from("a")), ("intCol", 1i64.into())]))
        .unwrap();
    let (seen, callback) = recorder();
    let _token = obj.observe(callback).unwrap();

    session.write(|_| obj.set(INT_COL, 2)).unwrap();
    session.refresh().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let change = &seen[0].properties()[0];
    assert_eq!(seen[0].properties().len(), 1);
    assert_eq!(change.name, "intCol");
    assert_eq!(change.old_value, Some(Value::Int64(1)));
    assert_eq!(change.new_value, Some(Value::Int64(2)));
}

#[test]
fn filter_excluding_property_suppresses_delivery() {
    let db = test_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("AllTypes", [("intCol", 1i64)])).unwrap();
    let (seen, callback) = recorder();
    let _token = obj.observe_key_paths(&["boolCol"], callback).unwrap();

    session.write(|_| obj.set_value("intCol", 2i64)).unwrap();
    assert!(seen.lock().is_empty());

    session
        .write(|_| {
            obj.set_value("intCol", 3i64)?;
            obj.set_value("boolCol", true)
        })
        .unwrap();
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let names: Vec<_> = seen[0].properties().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["boolCol", "intCol"]);
}

#[test]
fn registration_sets_the_baseline() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("Keyed", [("stringCol", "a")])).unwrap();
    session.write(|_| obj.set(INT_COL, 5)).unwrap();

    let (seen, callback) = recorder();
    let _token = obj.observe(callback).unwrap();
    session.write(|_| obj.set(INT_COL, 6)).unwrap();

    let seen = seen.lock();
    assert_eq!(seen[0].property("intCol").unwrap().old_value, Some(Value::Int64(5)));
}

#[test]
fn deletion_is_delivered_once() {
    let db = test_database();
    let session = db.session().unwrap();
    let ann = session.write(|s| s.create("Person", [("name", "Ann")])).unwrap();
    let (seen, callback) = recorder();
    let token = ann.observe(callback).unwrap();

    session.write(|s| s.delete(&ann)).unwrap();
    assert_eq!(token.state(), ObserverState::Invalidated);
    session.write(|s| s.create("Person", [("name", Input::from("Ann")), ("age", 9i64.into())])).unwrap();
    session.refresh().unwrap();

    let seen = seen.lock();
    assert_eq!(*seen, vec![ObjectChange::Deleted]);
}

#[test]
fn each_transition_is_delivered_in_order() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("Keyed", [("stringCol", "a")])).unwrap();
    let (seen, callback) = recorder();
    let _token = obj.observe(callback).unwrap();

    let writer = db.clone();
    thread::spawn(move || {
        let session = writer.session().unwrap();
        for value in [10i64, 20] {
            session
                .write(|s| {
                    let obj = s.object_for_primary_key("Keyed", "a")?.ok_or(Error::InvalidatedObject)?;
                    obj.set(INT_COL, value)
                })
                .unwrap();
        }
    })
    .join()
    .unwrap();

    assert!(seen.lock().is_empty());
    assert!(session.refresh().unwrap());
    let seen = seen.lock();
    let steps: Vec<_> = seen
        .iter()
        .map(|c| {
            let p = c.property("intCol").unwrap();
            (p.old_value.clone(), p.new_value.clone())
        })
        .collect();
    assert_eq!(
        steps,
        vec![
            (Some(Value::Int64(0)), Some(Value::Int64(10))),
            (Some(Value::Int64(10)), Some(Value::Int64(20))),
        ]
    );
}

#[test]
fn nested_key_paths_through_lists() {
    let db = test_database();
    let session = db.session().unwrap();
    let owner = session
        .write(|s| s.create("AllTypes", [("arrayCol", Input::list([Input::fields([("boolCol", false)])]))]))
        .unwrap();
    let (seen, callback) = recorder();
    let _token = owner.observe_key_paths(&["arrayCol.boolCol"], callback).unwrap();

    let element = owner.list("arrayCol").unwrap().objects().unwrap().remove(0);
    session.write(|_| element.set_value("boolCol", true)).unwrap();
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(
        seen.lock()[0].properties(),
        [PropertyChange {
            name: "boolCol".into(),
            old_value: Some(Value::Bool(false)),
            new_value: Some(Value::Bool(true)),
        }]
    );

    session
        .write(|_| owner.set_value("arrayCol", Input::list([Input::fields([("boolCol", true)])])))
        .unwrap();
    assert_eq!(seen.lock().len(), 2);

    session.write(|_| owner.set_value("intCol", 1i64)).unwrap();
    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn nested_key_paths_through_links() {
    let db = test_database();
    let session = db.session().unwrap();
    let owner = session
        .write(|s| s.create("AllTypes", [("objectCol", Input::fields([("boolCol", false)]))]))
        .unwrap();
    let (seen, callback) = recorder();
    let _token = owner.observe_key_paths(&["objectCol.boolCol"], callback).unwrap();

    let target = owner.value("objectCol").unwrap().into_object().unwrap();
    session.write(|_| target.set_value("boolCol", true)).unwrap();
    session.write(|_| owner.set_value("objectCol", Input::fields([("boolCol", false)]))).unwrap();
    session.write(|_| owner.set_value("objectCol", Input::null())).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert_eq!(
        seen[0].properties(),
        [PropertyChange {
            name: "boolCol".into(),
            old_value: Some(Value::Bool(false)),
            new_value: Some(Value::Bool(true)),
        }]
    );
    let relinked = seen[1].property("objectCol").unwrap();
    assert!(matches!(relinked.old_value, Some(Value::Link(_))));
    assert!(matches!(relinked.new_value, Some(Value::Link(_))));
    assert_ne!(relinked.old_value, relinked.new_value);
    let cleared = seen[2].property("objectCol").unwrap();
    assert!(cleared.old_value.is_some());
    assert_eq!(cleared.new_value, None);
    assert!(seen
        .iter()
        .flat_map(|c| c.properties())
        .all(|c| c.old_value != c.new_value));
}

#[test]
fn cross_thread_commit_needs_refresh() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("Keyed", [("stringCol", "a")])).unwrap();
    let (seen, callback) = recorder();
    let _token = obj.observe(callback).unwrap();

    let writer = db.clone();
    thread::spawn(move || {
        let session = writer.session().unwrap();
        session
            .write(|s| {
                let obj = s.object_for_primary_key("Keyed", "a")?.ok_or(Error::InvalidatedObject)?;
                obj.set(INT_COL, 1)
            })
            .unwrap();
    })
    .join()
    .unwrap();

    assert!(seen.lock().is_empty());
    assert_eq!(obj.get(INT_COL).unwrap(), 0);
    session.refresh().unwrap();
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(obj.get(INT_COL).unwrap(), 1);
}

#[test]
fn queue_observer_sees_deletion_on_its_thread() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("Keyed", [("stringCol", "a")])).unwrap();
    let queue = db.dispatch_queue("scenario").unwrap();
    let queue_thread = queue.thread_id();

    let (tx, rx) = mpsc::channel();
    let token = obj
        .observe_on(&queue, &["intCol"], move |change| {
            tx.send((thread::current().id(), change)).ok();
        })
        .unwrap();
    queue.sync().unwrap();

    session.write(|_| obj.set(INT_COL, 1)).unwrap();
    let (thread_id, change) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(thread_id, queue_thread);
    assert_eq!(change.property("intCol").unwrap().new_value, Some(Value::Int64(1)));

    session.write(|s| s.delete(&obj)).unwrap();
    let (thread_id, change) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(thread_id, queue_thread);
    assert!(change.is_deleted());
    queue.sync().unwrap();
    assert_eq!(token.state(), ObserverState::Invalidated);
    assert!(rx.try_recv().is_err());
}

#[test]
fn invalidate_is_idempotent() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("Keyed", [("stringCol", "a")])).unwrap();
    let (seen, callback) = recorder();
    let token = obj.observe(callback).unwrap();
    token.invalidate();
    token.invalidate();
    session.write(|_| obj.set(INT_COL, 1)).unwrap();
    assert!(seen.lock().is_empty());
    assert_eq!(token.state(), ObserverState::Invalidated);
}

#[test]
fn dropping_a_token_keeps_the_subscription() {
    let db = keyed_database();
    let session = db.session().unwrap();
    let obj = session.write(|s| s.create("Keyed", [("stringCol", "a")])).unwrap();
    let (seen, callback) = recorder();
    drop(obj.observe(callback).unwrap());
    session.write(|_| obj.set(INT_COL, 1)).unwrap();
    assert_eq!(seen.lock().len(), 1);
}

// ---- Typed and dynamic access agree ----

mod props {
    use super::*;
    use proptest::prelude::*;

    const INT8_COL: Prop<i8> = Prop::new("int8Col");

    proptest! {
        #[test]
        fn typed_and_dynamic_reads_agree(wide in any::<i64>(), narrow in any::<i8>(), text in ".{0,16}") {
            let obj = Object::new(all_types_schema());
            obj.set_value("intCol", wide).unwrap();
            obj.set(INT8_COL, narrow).unwrap();
            obj.at("stringCol").set(text.clone()).unwrap();

            prop_assert_eq!(obj.get(INT_COL).unwrap(), wide);
            prop_assert_eq!(obj.value("int8Col").unwrap().into_value(), Some(Value::Int8(narrow)));
            prop_assert_eq!(obj.value_as::<String>("stringCol").unwrap(), text);
        }

        #[test]
        fn out_of_range_integers_are_rejected(value in (i64::from(i8::MAX) + 1)..i64::MAX) {
            let obj = Object::new(all_types_schema());
            let rejected = matches!(obj.set_value("int8Col", value), Err(Error::TypeMismatch { .. }));
            prop_assert!(rejected);
            prop_assert_eq!(obj.get(INT8_COL).unwrap(), 0);
        }
    }
}
