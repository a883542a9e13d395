//! Row-level diff between two store versions.
//!
//! A row's diff is the set of dotted key paths whose value differs between
//! the versions. Scalars compare by value, links by target, lists by
//! content. When a link (or a link-list element) points at the same row in
//! both versions, the diff descends into that row and reports its changes
//! under the link's path, up to a depth limit that bounds cycles.
//!
//! Each reported [`PropertyChange`] is named after the field that actually
//! changed, so a change two links away carries that row's field name and
//! its own old and new values.

use std::collections::BTreeSet;
use std::sync::Arc;

use vellum_schema::{PropertyDescriptor, SchemaDescriptor};
use vellum_store::{ObjectStore, RowState, Transition};
use vellum_types::{RowRef, TableId, Value, Version};

use crate::error::{DiffError, DiffResult};
use crate::key_path::KeyPath;

/// Resolves the schema that describes a table or class.
pub trait SchemaLookup {
    fn schema_for_table(&self, table: TableId) -> Option<Arc<SchemaDescriptor>>;

    fn schema_for_class(&self, class: &str) -> Option<Arc<SchemaDescriptor>>;
}

/// One changed field as delivered to observers.
///
/// `name` is the field's own name, which for a nested change is the last
/// segment of its key path. `None` stands for an absent (null) value.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyChange {
    pub name: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// The changes on a row that still exists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowChanges {
    /// Every changed path, including nested ones.
    pub paths: BTreeSet<KeyPath>,
    /// Changed fields in traversal order: schema order, each link followed
    /// depth first. Identical entries are listed once.
    pub properties: Vec<PropertyChange>,
}

impl RowChanges {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }
}

/// Outcome of diffing a row between two versions.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectDiff {
    /// Nothing observable changed, or the row did not exist at the start.
    Unchanged,
    /// The row existed at the start and does not exist at the end.
    Deleted,
    Changed(RowChanges),
}

/// Diffs rows of one store.
///
/// When the two versions are one commit apart, the store's recorded
/// [`Transition`] narrows the work: rows the commit did not touch are read
/// once and only followed through their links.
pub struct RowDiffer<'a> {
    store: &'a dyn ObjectStore,
    schemas: &'a dyn SchemaLookup,
    max_depth: usize,
}

/// State of one diff call.
struct Walk<'t> {
    from: Version,
    to: Version,
    transition: Option<&'t Transition>,
    paths: BTreeSet<KeyPath>,
    properties: Vec<PropertyChange>,
}

impl Walk<'_> {
    fn touched(&self, row: RowRef) -> bool {
        self.transition.map_or(true, |t| t.touches(row))
    }

    fn record(&mut self, path: KeyPath, before: Value, after: Value) {
        let change = PropertyChange {
            name: path.segments().last().cloned().unwrap_or_default(),
            old_value: before.into_option(),
            new_value: after.into_option(),
        };
        self.paths.insert(path);
        if !self.properties.contains(&change) {
            self.properties.push(change);
        }
    }
}

impl<'a> RowDiffer<'a> {
    /// `max_depth` is the longest key path (in segments) that will be
    /// reported; it is at least one.
    pub fn new(store: &'a dyn ObjectStore, schemas: &'a dyn SchemaLookup, max_depth: usize) -> Self {
        Self {
            store,
            schemas,
            max_depth: max_depth.max(1),
        }
    }

    /// Diff `row` between `from` and `to`.
    pub fn diff(&self, row: RowRef, from: Version, to: Version) -> DiffResult<ObjectDiff> {
        let schema = self.schema(row.table)?;
        let transition = self.store.transition(to).filter(|t| t.from == from);
        let mut walk = Walk {
            from,
            to,
            transition: transition.as_deref(),
            paths: BTreeSet::new(),
            properties: Vec::new(),
        };

        if let Some(t) = walk.transition {
            if t.deleted.contains(&row) {
                return Ok(ObjectDiff::Deleted);
            }
        }

        if walk.touched(row) {
            let old = self.store.read_row(row, from)?;
            let new = self.store.read_row(row, to)?;
            match (old, new) {
                (Some(_), None) => return Ok(ObjectDiff::Deleted),
                (None, _) => return Ok(ObjectDiff::Unchanged),
                (Some(old), Some(new)) => self.collect(&mut walk, &schema, &old, &new, None)?,
            }
        } else {
            self.visit_untouched(&mut walk, row, &schema, None)?;
        }

        if walk.paths.is_empty() {
            return Ok(ObjectDiff::Unchanged);
        }
        Ok(ObjectDiff::Changed(RowChanges {
            paths: walk.paths,
            properties: walk.properties,
        }))
    }

    fn schema(&self, table: TableId) -> DiffResult<Arc<SchemaDescriptor>> {
        self.schemas
            .schema_for_table(table)
            .ok_or(DiffError::UnknownTable(table))
    }

    fn collect(
        &self,
        walk: &mut Walk<'_>,
        schema: &SchemaDescriptor,
        old: &RowState,
        new: &RowState,
        prefix: Option<&KeyPath>,
    ) -> DiffResult<()> {
        for prop in schema.persisted_properties() {
            let path = match prefix {
                Some(p) => p.child(&prop.name),
                None => KeyPath::property(&prop.name),
            };
            let before = stored(old, prop);
            let after = stored(new, prop);
            if !prop.is_relationship() || path.len() >= self.max_depth {
                if before != after {
                    walk.record(path, before, after);
                }
                continue;
            }

            // Descend into targets present on both sides.
            let targets: BTreeSet<RowRef> = links(&before)
                .intersection(&links(&after))
                .copied()
                .collect();
            if before != after {
                walk.record(path.clone(), before, after);
            }
            for target in targets {
                self.descend(walk, target, &path)?;
            }
        }
        Ok(())
    }

    fn descend(&self, walk: &mut Walk<'_>, target: RowRef, path: &KeyPath) -> DiffResult<()> {
        let schema = self.schema(target.table)?;
        if !walk.touched(target) {
            return self.visit_untouched(walk, target, &schema, Some(path));
        }
        let (Some(old), Some(new)) = (
            self.store.read_row(target, walk.from)?,
            self.store.read_row(target, walk.to)?,
        ) else {
            return Ok(());
        };
        self.collect(walk, &schema, &old, &new, Some(path))
    }

    /// A row the transition did not write holds the same state on both
    /// sides, so only rows behind its links can contribute changes.
    fn visit_untouched(
        &self,
        walk: &mut Walk<'_>,
        row: RowRef,
        schema: &SchemaDescriptor,
        prefix: Option<&KeyPath>,
    ) -> DiffResult<()> {
        let depth = prefix.map_or(0, KeyPath::len);
        if depth + 1 >= self.max_depth
            || !schema.persisted_properties().any(|p| p.is_relationship())
        {
            return Ok(());
        }
        let Some(state) = self.store.read_row(row, walk.to)? else {
            return Ok(());
        };
        self.collect(walk, schema, &state, &state, prefix)
    }
}

fn stored(state: &RowState, prop: &PropertyDescriptor) -> Value {
    state.get(&prop.name).cloned().unwrap_or(Value::Null)
}

fn links(value: &Value) -> BTreeSet<RowRef> {
    match value {
        Value::Link(r) => BTreeSet::from([*r]),
        Value::List(items) => items.iter().filter_map(Value::as_link).collect(),
        _ => BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vellum_schema::SchemaSet;
    use vellum_store::{InMemoryStore, Snapshot, StoreResult, SubscriptionId, TransitionCallback, WriteBatch};
    use vellum_types::PropertyType;

    struct Fixture {
        store: InMemoryStore,
        tables: HashMap<TableId, Arc<SchemaDescriptor>>,
        set: SchemaSet,
    }

    impl SchemaLookup for Fixture {
        fn schema_for_table(&self, table: TableId) -> Option<Arc<SchemaDescriptor>> {
            self.tables.get(&table).cloned()
        }

        fn schema_for_class(&self, class: &str) -> Option<Arc<SchemaDescriptor>> {
            self.set.get(class).cloned()
        }
    }

    impl Fixture {
        fn new() -> Self {
            let owner = SchemaDescriptor::builder("Owner")
                .property(PropertyDescriptor::new("name", PropertyType::String))
                .property(PropertyDescriptor::new("age", PropertyType::Int64).optional())
                .property(PropertyDescriptor::link("dog", "Dog"))
                .property(PropertyDescriptor::object_list("dogs", "Dog"))
                .property(PropertyDescriptor::link("self_link", "Owner"))
                .build()
                .unwrap();
            let dog = SchemaDescriptor::builder("Dog")
                .property(PropertyDescriptor::new("name", PropertyType::String))
                .property(PropertyDescriptor::new("good", PropertyType::Bool))
                .build()
                .unwrap();
            let set = SchemaSet::from_schemas([Arc::new(owner), Arc::new(dog)]).unwrap();
            let store = InMemoryStore::new();
            let mut tables = HashMap::new();
            for schema in set.iter() {
                tables.insert(store.register_table(schema.class_name()), Arc::clone(schema));
            }
            Self { store, tables, set }
        }

        fn table(&self, class: &str) -> TableId {
            self.store.table_id(class).unwrap()
        }

        fn write(&self, rows: Vec<(RowRef, Option<RowState>)>) -> Version {
            let mut batch = self.store.begin_write().unwrap();
            for (row, state) in rows {
                match state {
                    Some(s) => batch.put_row(row, s),
                    None => batch.delete_row(row),
                }
            }
            self.store.commit_write(batch).unwrap()
        }

        fn differ(&self, depth: usize) -> RowDiffer<'_> {
            RowDiffer::new(&self.store, self, depth)
        }
    }

    fn row(fields: &[(&str, Value)]) -> RowState {
        fields
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn names(diff: &ObjectDiff) -> Vec<&str> {
        match diff {
            ObjectDiff::Changed(c) => c.property_names().collect(),
            _ => vec![],
        }
    }

    #[test]
    fn scalar_change_reports_old_and_new() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let v1 = fx.write(vec![(o, Some(row(&[("name", "a".into())])))]);
        let v2 = fx.write(vec![(o, Some(row(&[("name", "b".into())])))]);

        let diff = fx.differ(4).diff(o, v1, v2).unwrap();
        let ObjectDiff::Changed(changes) = diff else {
            panic!("expected change");
        };
        assert_eq!(
            changes.properties,
            vec![PropertyChange {
                name: "name".into(),
                old_value: Some(Value::String("a".into())),
                new_value: Some(Value::String("b".into())),
            }]
        );
    }

    #[test]
    fn null_transitions_are_absent_values() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let v1 = fx.write(vec![(o, Some(row(&[("age", Value::Null)])))]);
        let v2 = fx.write(vec![(o, Some(row(&[("age", Value::Int64(3))])))]);

        let ObjectDiff::Changed(changes) = fx.differ(4).diff(o, v1, v2).unwrap() else {
            panic!("expected change");
        };
        assert_eq!(changes.properties[0].old_value, None);
        assert_eq!(changes.properties[0].new_value, Some(Value::Int64(3)));
    }

    #[test]
    fn identical_rewrite_is_unchanged() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let v1 = fx.write(vec![(o, Some(row(&[("name", "a".into())])))]);
        let v2 = fx.write(vec![(o, Some(row(&[("name", "a".into())])))]);
        assert_eq!(fx.differ(4).diff(o, v1, v2).unwrap(), ObjectDiff::Unchanged);
    }

    #[test]
    fn deletion_and_missing_rows() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let v1 = fx.write(vec![(o, Some(row(&[])))]);
        let v2 = fx.write(vec![(o, None)]);
        assert_eq!(fx.differ(4).diff(o, v1, v2).unwrap(), ObjectDiff::Deleted);
        assert_eq!(
            fx.differ(4).diff(o, Version::ZERO, v1).unwrap(),
            ObjectDiff::Unchanged
        );
    }

    #[test]
    fn nested_link_change_is_named_after_the_field() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let d = fx.store.allocate_row(fx.table("Dog")).unwrap();
        let v1 = fx.write(vec![
            (o, Some(row(&[("dog", Value::Link(d))]))),
            (d, Some(row(&[("name", "rex".into())]))),
        ]);
        let v2 = fx.write(vec![(d, Some(row(&[("name", "max".into())])))]);

        let ObjectDiff::Changed(changes) = fx.differ(4).diff(o, v1, v2).unwrap() else {
            panic!("expected change");
        };
        assert!(changes.paths.contains(&KeyPath::parse("dog.name").unwrap()));
        assert!(!changes.paths.contains(&KeyPath::property("dog")));
        assert_eq!(
            changes.properties,
            vec![PropertyChange {
                name: "name".into(),
                old_value: Some(Value::String("rex".into())),
                new_value: Some(Value::String("max".into())),
            }]
        );
    }

    #[test]
    fn relinking_reports_old_and_new_targets() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let a = fx.store.allocate_row(fx.table("Dog")).unwrap();
        let b = fx.store.allocate_row(fx.table("Dog")).unwrap();
        let v1 = fx.write(vec![
            (o, Some(row(&[("dog", Value::Link(a))]))),
            (a, Some(row(&[]))),
            (b, Some(row(&[]))),
        ]);
        let v2 = fx.write(vec![(o, Some(row(&[("dog", Value::Link(b))])))]);

        let ObjectDiff::Changed(changes) = fx.differ(4).diff(o, v1, v2).unwrap() else {
            panic!("expected change");
        };
        assert_eq!(
            changes.properties,
            vec![PropertyChange {
                name: "dog".into(),
                old_value: Some(Value::Link(a)),
                new_value: Some(Value::Link(b)),
            }]
        );
    }

    #[test]
    fn depth_limit_stops_descent() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let d = fx.store.allocate_row(fx.table("Dog")).unwrap();
        let v1 = fx.write(vec![
            (o, Some(row(&[("dog", Value::Link(d))]))),
            (d, Some(row(&[("name", "rex".into())]))),
        ]);
        let v2 = fx.write(vec![(d, Some(row(&[("name", "max".into())])))]);
        assert_eq!(fx.differ(1).diff(o, v1, v2).unwrap(), ObjectDiff::Unchanged);
    }

    #[test]
    fn list_element_change_carries_the_element_values() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let d = fx.store.allocate_row(fx.table("Dog")).unwrap();
        let v1 = fx.write(vec![
            (o, Some(row(&[("dogs", Value::List(vec![Value::Link(d)]))]))),
            (d, Some(row(&[("good", false.into())]))),
        ]);
        let v2 = fx.write(vec![(d, Some(row(&[("good", true.into())])))]);

        let diff = fx.differ(4).diff(o, v1, v2).unwrap();
        assert_eq!(names(&diff), ["good"]);
        let ObjectDiff::Changed(changes) = diff else {
            unreachable!()
        };
        assert!(changes.paths.contains(&KeyPath::parse("dogs.good").unwrap()));
        assert!(!changes.paths.contains(&KeyPath::parse("dogs").unwrap()));
        let change = &changes.properties[0];
        assert_eq!(change.old_value, Some(Value::Bool(false)));
        assert_eq!(change.new_value, Some(Value::Bool(true)));
        assert!(changes.properties.iter().all(|c| c.old_value != c.new_value));
    }

    #[test]
    fn list_membership_change() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let d = fx.store.allocate_row(fx.table("Dog")).unwrap();
        let v1 = fx.write(vec![
            (o, Some(row(&[("dogs", Value::List(vec![]))]))),
            (d, Some(row(&[]))),
        ]);
        let v2 = fx.write(vec![(
            o,
            Some(row(&[("dogs", Value::List(vec![Value::Link(d)]))])),
        )]);
        let ObjectDiff::Changed(changes) = fx.differ(4).diff(o, v1, v2).unwrap() else {
            panic!("expected change");
        };
        assert!(changes.paths.contains(&KeyPath::property("dogs")));
        assert_eq!(changes.properties[0].new_value, Some(Value::List(vec![Value::Link(d)])));
    }

    #[test]
    fn self_cycle_terminates() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let v1 = fx.write(vec![(
            o,
            Some(row(&[("name", "a".into()), ("self_link", Value::Link(o))])),
        )]);
        let v2 = fx.write(vec![(
            o,
            Some(row(&[("name", "b".into()), ("self_link", Value::Link(o))])),
        )]);
        let ObjectDiff::Changed(changes) = fx.differ(3).diff(o, v1, v2).unwrap() else {
            panic!("expected change");
        };
        assert_eq!(changes.property_names().collect::<Vec<_>>(), ["name"]);
        assert!(changes
            .paths
            .contains(&KeyPath::parse("self_link.self_link.name").unwrap()));
        assert!(changes.paths.iter().all(|p| p.len() <= 3));
    }

    #[test]
    fn multiple_changes_listed_once_in_schema_order() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let v1 = fx.write(vec![(o, Some(row(&[("name", "a".into())])))]);
        let v2 = fx.write(vec![(
            o,
            Some(row(&[("age", Value::Int64(1)), ("name", "b".into())])),
        )]);
        assert_eq!(names(&fx.differ(4).diff(o, v1, v2).unwrap()), ["name", "age"]);
    }

    #[test]
    fn change_behind_an_unwritten_row_is_found() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let p = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let d = fx.store.allocate_row(fx.table("Dog")).unwrap();
        let v1 = fx.write(vec![
            (o, Some(row(&[("self_link", Value::Link(p))]))),
            (p, Some(row(&[("dog", Value::Link(d))]))),
            (d, Some(row(&[("name", "rex".into())]))),
        ]);
        let v2 = fx.write(vec![(d, Some(row(&[("name", "max".into())])))]);

        let diff = fx.differ(4).diff(o, v1, v2).unwrap();
        assert_eq!(names(&diff), ["name"]);
        let ObjectDiff::Changed(changes) = diff else {
            unreachable!()
        };
        assert!(changes
            .paths
            .contains(&KeyPath::parse("self_link.dog.name").unwrap()));
    }

    /// Store wrapper that counts row reads.
    struct CountingStore<'a> {
        inner: &'a InMemoryStore,
        reads: AtomicUsize,
    }

    impl ObjectStore for CountingStore<'_> {
        fn latest_version(&self) -> Version {
            self.inner.latest_version()
        }

        fn register_table(&self, class_name: &str) -> TableId {
            self.inner.register_table(class_name)
        }

        fn table_id(&self, class_name: &str) -> Option<TableId> {
            self.inner.table_id(class_name)
        }

        fn table_name(&self, table: TableId) -> Option<String> {
            self.inner.table_name(table)
        }

        fn allocate_row(&self, table: TableId) -> StoreResult<RowRef> {
            self.inner.allocate_row(table)
        }

        fn read_row(&self, row: RowRef, version: Version) -> StoreResult<Option<Arc<RowState>>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_row(row, version)
        }

        fn enumerate_rows(&self, table: TableId, version: Version) -> StoreResult<Vec<RowRef>> {
            self.inner.enumerate_rows(table, version)
        }

        fn begin_write(&self) -> StoreResult<WriteBatch> {
            self.inner.begin_write()
        }

        fn commit_write(&self, batch: WriteBatch) -> StoreResult<Version> {
            self.inner.commit_write(batch)
        }

        fn abort_write(&self, batch: WriteBatch) {
            self.inner.abort_write(batch)
        }

        fn transition(&self, version: Version) -> Option<Arc<Transition>> {
            self.inner.transition(version)
        }

        fn subscribe_transitions(&self, callback: TransitionCallback) -> SubscriptionId {
            self.inner.subscribe_transitions(callback)
        }

        fn unsubscribe(&self, id: SubscriptionId) -> bool {
            self.inner.unsubscribe(id)
        }

        fn open_snapshot(self: Arc<Self>, _version: Version) -> StoreResult<Snapshot> {
            unimplemented!("the differ never opens snapshots")
        }
    }

    #[test]
    fn untouched_rows_are_not_compared() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let d = fx.store.allocate_row(fx.table("Dog")).unwrap();
        let other = fx.store.allocate_row(fx.table("Dog")).unwrap();
        fx.write(vec![
            (o, Some(row(&[("name", "a".into()), ("dog", Value::Link(d))]))),
            (d, Some(row(&[("name", "rex".into())]))),
        ]);
        let v2 = fx.write(vec![(other, Some(row(&[("name", "max".into())])))]);
        let v3 = fx.write(vec![(other, Some(row(&[("name", "bo".into())])))]);

        let counting = CountingStore {
            inner: &fx.store,
            reads: AtomicUsize::new(0),
        };
        let differ = RowDiffer::new(&counting, &fx, 4);

        // Owner is read once to follow its links; Dog has none to follow.
        assert_eq!(differ.diff(o, v2, v3).unwrap(), ObjectDiff::Unchanged);
        assert_eq!(counting.reads.load(Ordering::SeqCst), 1);

        // Nothing to follow at depth one.
        counting.reads.store(0, Ordering::SeqCst);
        let shallow = RowDiffer::new(&counting, &fx, 1);
        assert_eq!(shallow.diff(o, v2, v3).unwrap(), ObjectDiff::Unchanged);
        assert_eq!(counting.reads.load(Ordering::SeqCst), 0);

        // Spans longer than one commit fall back to full reads.
        counting.reads.store(0, Ordering::SeqCst);
        assert_eq!(differ.diff(o, Version(1), v3).unwrap(), ObjectDiff::Unchanged);
        assert!(counting.reads.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn recorded_deletion_short_circuits() {
        let fx = Fixture::new();
        let o = fx.store.allocate_row(fx.table("Owner")).unwrap();
        let v1 = fx.write(vec![(o, Some(row(&[])))]);
        let v2 = fx.write(vec![(o, None)]);
        let counting = CountingStore {
            inner: &fx.store,
            reads: AtomicUsize::new(0),
        };
        let differ = RowDiffer::new(&counting, &fx, 4);
        assert_eq!(differ.diff(o, v1, v2).unwrap(), ObjectDiff::Deleted);
        assert_eq!(counting.reads.load(Ordering::SeqCst), 0);
    }
}
