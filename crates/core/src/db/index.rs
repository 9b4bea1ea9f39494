use facetdb_primitives::RecordId;
use facetdb_value::Atom;

use crate::error::QueryError;
use crate::query::eval::{eval, Scope};
use crate::query::expr::{Q, QueryExpr};

use super::record::Record;
use super::view::FilteredView;
use super::SharedState;

/// An index over registered records.
///
/// `Index` is a cloneable handle; clones share one state behind a single
/// `RwLock`, giving the single-writer / many-readers discipline: queries
/// and materialization take the read lock and may proceed in parallel,
/// while registration, removal and dispatched attribute writes serialize
/// behind the write lock.
///
/// Lock order: the index lock is taken before a record's bag is read, and
/// a record never holds its own locks while calling into an index, so the
/// two levels cannot deadlock.
#[derive(Clone, Default)]
pub struct Index {
    state: SharedState,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> &SharedState {
        &self.state
    }

    /// Registers `record`, fanning its attributes out into the per-attribute
    /// structures and hooking its mutation callback. Re-adding is a no-op.
    pub fn add(&self, record: &Record) {
        let mut state = self.state.write();
        if state.register(record) {
            record.install_observer(&self.state);
            log::trace!("registered {record:?}");
        }
    }

    pub fn add_many(&self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.add(&record);
        }
    }

    /// Unregisters `record`: its postings, range entries and edges are
    /// dropped and its callback unhooked. The record itself stays alive and
    /// usable. Returns whether it was a member.
    pub fn remove(&self, record: &Record) -> bool {
        let removed = self.state.write().destroy(record.id());
        match removed {
            Some(record) => {
                record.uninstall_observer(&self.state);
                log::trace!("removed {record:?}");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.state.read().contains(record.id())
    }

    /// All registered records, in ascending handle order.
    pub fn collect(&self) -> Vec<Record> {
        let state = self.state.read();
        let mut records: Vec<Record> = state.records().cloned().collect();
        records.sort_unstable_by_key(Record::id);
        records
    }

    /// Evaluates `expr` and captures the matches as a [`FilteredView`].
    pub fn reduced_query(&self, expr: &QueryExpr) -> FilteredView {
        let allow = eval(&self.state.read(), expr, Scope::Full);
        FilteredView::new(self.clone(), allow)
    }

    /// Equality-only sugar: a view of the records matching every
    /// `(path, value)` pair.
    pub fn reduced(&self, attrs: &[(&str, Atom)]) -> Result<FilteredView, QueryError> {
        Ok(self.reduced_query(&Q::eq_all(attrs)?))
    }

    /// `reduced(attrs).collect()` without holding a view.
    pub fn get_by_attribute(&self, attrs: &[(&str, Atom)]) -> Result<Vec<Record>, QueryError> {
        Ok(self.reduced(attrs)?.collect())
    }

    /// In-place removal of every record *not* matching `expr`.
    ///
    /// This mutates the index and unhooks the dropped records; when the
    /// survivors are only needed for further querying, building a view with
    /// [`Index::reduced_query`] is the cheaper choice.
    pub fn reduce_query(&self, expr: &QueryExpr) {
        let stale: Vec<Record> = {
            let mut state = self.state.write();
            let keep = eval(&state, expr, Scope::Full);
            let drop_ids: Vec<RecordId> = state.handles().filter(|h| !keep.contains(h)).collect();
            drop_ids.into_iter().filter_map(|h| state.destroy(h)).collect()
        };
        for record in &stale {
            record.uninstall_observer(&self.state);
        }
        if !stale.is_empty() {
            log::debug!("reduce dropped {} records", stale.len());
        }
    }

    /// Equality-only sugar over [`Index::reduce_query`].
    pub fn reduce(&self, attrs: &[(&str, Atom)]) -> Result<(), QueryError> {
        self.reduce_query(&Q::eq_all(attrs)?);
        Ok(())
    }

    /// A new index holding the union of both inputs' records, registered in
    /// arrival order (self's first). Neither input is mutated.
    pub fn union_with(&self, other: &Index) -> Index {
        let mine: Vec<Record> = self.state.read().records().cloned().collect();
        let theirs: Vec<Record> = other.state.read().records().cloned().collect();
        log::trace!("union of {} and {} records", mine.len(), theirs.len());
        let out = Index::new();
        out.add_many(mine);
        out.add_many(theirs);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_value::attrs;
    use pretty_assertions::assert_eq;

    fn person(name: &str, age: i64, wage: i64) -> Record {
        Record::with_attrs(attrs!["name" => name, "age" => age, "wage" => wage])
    }

    fn names(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| match r.get("name") {
                Some(Atom::Str(s)) => s.into_string(),
                other => panic!("record without a name: {other:?}"),
            })
            .collect()
    }

    #[test]
    fn add_is_idempotent_and_ordered() {
        let index = Index::new();
        let a = person("A", 30, 70_000);
        let b = person("B", 25, 50_000);
        index.add(&b);
        index.add(&a);
        index.add(&b);
        assert_eq!(index.len(), 2);
        // Collection is by handle, not arrival.
        assert_eq!(names(&index.collect()), vec!["A", "B"]);
        index.state().read().assert_consistent();
    }

    #[test]
    fn mutations_flow_through_the_observer() {
        let index = Index::new();
        let a = person("A", 30, 70_000);
        index.add(&a);

        a.set("age", 31);
        let hits = index.get_by_attribute(&[("age", Atom::I64(31))]).unwrap();
        assert_eq!(hits, vec![a.clone()]);
        assert!(index.get_by_attribute(&[("age", Atom::I64(30))]).unwrap().is_empty());
        index.state().read().assert_consistent();
    }

    #[test]
    fn removal_unhooks_the_observer() {
        let index = Index::new();
        let a = person("A", 30, 70_000);
        index.add(&a);
        assert!(index.remove(&a));
        assert!(!index.remove(&a));
        assert!(index.is_empty());

        // Later writes must not resurrect postings.
        a.set("age", 99);
        assert!(index.get_by_attribute(&[("age", Atom::I64(99))]).unwrap().is_empty());
        index.state().read().assert_consistent();
    }

    #[test]
    fn reduce_keeps_only_matches() {
        let index = Index::new();
        let a = person("A", 30, 70_000);
        let b = person("B", 25, 50_000);
        index.add_many([a.clone(), b.clone()]);

        index.reduce(&[("name", Atom::from("A"))]).unwrap();
        assert_eq!(index.collect(), vec![a.clone()]);

        // The dropped record no longer reports to this index.
        b.set("name", "A");
        assert_eq!(index.len(), 1);
        index.state().read().assert_consistent();
    }

    #[test]
    fn union_does_not_mutate_inputs() {
        let left = Index::new();
        let right = Index::new();
        let a = person("A", 30, 70_000);
        let b = person("B", 25, 50_000);
        left.add(&a);
        right.add(&b);

        let both = left.union_with(&right);
        assert_eq!(names(&both.collect()), vec!["A", "B"]);
        assert_eq!(left.len(), 1);
        assert_eq!(right.len(), 1);

        // A record in the union answers queries in the union only once, and
        // mutations reach all indexes it belongs to.
        a.set("age", 40);
        assert_eq!(both.get_by_attribute(&[("age", Atom::I64(40))]).unwrap().len(), 1);
        assert_eq!(left.get_by_attribute(&[("age", Atom::I64(40))]).unwrap().len(), 1);
        both.state().read().assert_consistent();
    }

    #[test]
    fn overlapping_union_registers_once() {
        let left = Index::new();
        let right = Index::new();
        let a = person("A", 30, 70_000);
        left.add(&a);
        right.add(&a);
        let both = left.union_with(&right);
        assert_eq!(both.len(), 1);
    }
}
