use facetdb_primitives::{AttrId, IntMap, RecordId};
use facetdb_value::Atom;
use indexmap::{IndexMap, IndexSet};

use super::attr_index::AttrIndex;
use super::edges::EdgeTable;
use super::record::Record;

/// Everything one `Index` owns, kept behind a single `RwLock`.
///
/// The snapshots are the authority: `records` holds the strong references
/// and the arrival order, `snapshots` holds the engine's view of every
/// handle's current indexable attributes, and the per-attribute structures
/// plus the edge table are derived from the snapshots and kept in step by
/// [`IndexState::apply_set`]. Queries read snapshots and indexes only,
/// never the records' own bags.
#[derive(Default)]
pub(crate) struct IndexState {
    /// Registered records in arrival order.
    records: IndexMap<RecordId, Record>,
    /// Handle -> current indexable attribute values.
    snapshots: IntMap<RecordId, IndexMap<AttrId, Atom>>,
    /// Attribute-name interner; an `AttrId` is a position in this set.
    attr_names: IndexSet<Box<str>>,
    /// Per-attribute equality and range structures.
    attrs: IntMap<AttrId, AttrIndex>,
    /// Reference edges between registered handles.
    edges: EdgeTable,
}

impl IndexState {
    pub fn attr_id(&self, name: &str) -> Option<AttrId> {
        self.attr_names.get_index_of(name).map(|i| AttrId(i as u32))
    }

    fn intern(&mut self, name: &str) -> AttrId {
        if let Some(i) = self.attr_names.get_index_of(name) {
            return AttrId(i as u32);
        }
        let (i, _) = self.attr_names.insert_full(name.into());
        AttrId(i as u32)
    }

    pub fn attr_index(&self, attr: AttrId) -> Option<&AttrIndex> {
        self.attrs.get(&attr)
    }

    pub fn edges(&self) -> &EdgeTable {
        &self.edges
    }

    pub fn contains(&self, h: RecordId) -> bool {
        self.records.contains_key(&h)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn handles(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records.keys().copied()
    }

    /// Registered records, in arrival order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn record(&self, h: RecordId) -> Option<&Record> {
        self.records.get(&h)
    }

    /// Adds `record` to the registry and fans its attributes out into the
    /// per-attribute structures. Returns false if the handle was already
    /// registered (re-add is a no-op).
    pub fn register(&mut self, record: &Record) -> bool {
        let h = record.id();
        if self.records.contains_key(&h) {
            return false;
        }
        self.records.insert(h, record.clone());
        self.snapshots.insert(h, IndexMap::new());
        for (name, value) in record.attributes() {
            self.apply_set(h, &name, Some(value));
        }
        true
    }

    /// The dispatcher primitive: attribute `name` of `h` is now `new`
    /// (`None` means deleted).
    ///
    /// Reads the prior value from the snapshot, swaps the posting-list,
    /// range and edge entries, and updates the snapshot, all under the
    /// caller's write lock so the `(remove, insert)` pair is atomic with
    /// respect to readers. Setting an attribute to its current value is a
    /// no-op. Events for unregistered handles and for `_`-prefixed names
    /// are ignored.
    pub fn apply_set(&mut self, h: RecordId, name: &str, new: Option<Atom>) {
        if !self.records.contains_key(&h) || name.starts_with('_') {
            return;
        }
        let attr = match &new {
            Some(_) => self.intern(name),
            // A delete of a never-seen attribute has nothing to undo.
            None => match self.attr_id(name) {
                Some(attr) => attr,
                None => return,
            },
        };
        let old = self.snapshots.get(&h).and_then(|snap| snap.get(&attr)).cloned();
        if old == new {
            return;
        }
        if let Some(old) = &old {
            let Some(ai) = self.attrs.get_mut(&attr) else {
                panic!("posting list inconsistency: no index for attribute `{name}`");
            };
            ai.delete(old, h);
            if old.as_ref_id().is_some() {
                self.edges.unlink(h, attr);
            }
        }
        match new {
            Some(value) => {
                self.attrs.entry(attr).or_default().insert(&value, h);
                if let Some(child) = value.as_ref_id() {
                    self.edges.link(h, attr, child);
                }
                self.snapshots
                    .get_mut(&h)
                    .expect("registered record has a snapshot")
                    .insert(attr, value);
            }
            None => {
                if let Some(snap) = self.snapshots.get_mut(&h) {
                    snap.shift_remove(&attr);
                }
            }
        }
    }

    /// Removes `h` entirely: every snapshot attribute is unindexed, edges
    /// pointing at `h` are severed in both directions, and the strong
    /// reference is released to the caller (which uninstalls the observer
    /// outside the lock).
    pub fn destroy(&mut self, h: RecordId) -> Option<Record> {
        let record = self.records.shift_remove(&h)?;
        let snapshot = self.snapshots.remove(&h).unwrap_or_default();
        for (attr, value) in &snapshot {
            let Some(ai) = self.attrs.get_mut(attr) else {
                panic!("posting list inconsistency: no index for attribute {attr}");
            };
            ai.delete(value, h);
            if value.as_ref_id().is_some() {
                self.edges.unlink(h, *attr);
            }
        }
        self.edges.sever_child(h);
        Some(record)
    }

    /// Structural check of the snapshot/index agreement, for tests.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (&h, snap) in &self.snapshots {
            assert!(self.records.contains_key(&h), "snapshot without registry entry");
            for (attr, value) in snap {
                let ai = self.attrs.get(attr).expect("indexed attribute has an index");
                assert!(
                    ai.seek_eq(value).contains(&h),
                    "{h} missing from posting list of {value}"
                );
            }
        }
        for (&h, _) in &self.records {
            assert!(self.snapshots.contains_key(&h), "registry entry without snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_value::attrs;

    fn registered(attrs: Vec<(Box<str>, Atom)>) -> (IndexState, Record) {
        let mut state = IndexState::default();
        let record = Record::with_attrs(attrs);
        assert!(state.register(&record));
        (state, record)
    }

    #[test]
    fn register_fans_out_and_is_idempotent() {
        let (mut state, record) = registered(attrs!["name" => "A", "age" => 30]);
        let h = record.id();
        state.assert_consistent();

        let age = state.attr_id("age").unwrap();
        assert_eq!(state.attr_index(age).unwrap().seek_eq(&Atom::I64(30)), &[h]);
        assert!(!state.register(&record));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn set_moves_the_posting() {
        let (mut state, record) = registered(attrs!["age" => 30]);
        let h = record.id();
        state.apply_set(h, "age", Some(Atom::I64(31)));
        state.assert_consistent();

        let age = state.attr_id("age").unwrap();
        assert!(state.attr_index(age).unwrap().seek_eq(&Atom::I64(30)).is_empty());
        assert_eq!(state.attr_index(age).unwrap().seek_eq(&Atom::I64(31)), &[h]);
    }

    #[test]
    fn idempotent_set_changes_nothing() {
        let (mut state, record) = registered(attrs!["age" => 30]);
        let h = record.id();
        // A float numerically equal to the current int is "its current value".
        state.apply_set(h, "age", Some(Atom::from(30.0)));
        let age = state.attr_id("age").unwrap();
        assert_eq!(state.attr_index(age).unwrap().len_eq(&Atom::I64(30)), 1);
        state.assert_consistent();
    }

    #[test]
    fn underscored_and_unknown_events_are_ignored() {
        let (mut state, record) = registered(attrs!["name" => "A"]);
        let h = record.id();
        state.apply_set(h, "_hidden", Some(Atom::I64(1)));
        assert_eq!(state.attr_id("_hidden"), None);
        state.apply_set(h, "never_set", None);
        state.apply_set(RecordId(u64::MAX), "name", Some(Atom::from("B")));
        state.assert_consistent();
    }

    #[test]
    fn ref_attrs_maintain_edges() {
        let store = Record::with_attrs(attrs!["name" => "Big"]);
        let mut state = IndexState::default();
        state.register(&store);
        let worker = Record::with_attrs(attrs!["employer" => &store]);
        state.register(&worker);

        let employer = state.attr_id("employer").unwrap();
        assert_eq!(
            state.edges().referrers(store.id()),
            &[(worker.id(), employer)]
        );

        state.apply_set(worker.id(), "employer", None);
        assert!(state.edges().referrers(store.id()).is_empty());
        state.assert_consistent();
    }

    #[test]
    fn destroy_unindexes_and_severs() {
        let store = Record::with_attrs(attrs!["name" => "Big"]);
        let worker = Record::with_attrs(attrs!["employer" => &store, "age" => 30]);
        let mut state = IndexState::default();
        state.register(&store);
        state.register(&worker);

        let removed = state.destroy(store.id()).unwrap();
        assert_eq!(removed, store);
        assert!(!state.contains(store.id()));
        // The worker keeps its dangling ref atom; the edge is gone.
        assert!(state.edges().referrers(store.id()).is_empty());
        let employer = state.attr_id("employer").unwrap();
        assert_eq!(
            state.attr_index(employer).unwrap().seek_eq(&Atom::from(&store)),
            &[worker.id()]
        );
        state.assert_consistent();

        // Overwriting the dangling ref later is safe.
        state.apply_set(worker.id(), "employer", Some(Atom::Null));
        state.assert_consistent();
    }
}
