use facetdb_primitives::{IntSet, RecordId};
use facetdb_value::Atom;

use crate::error::QueryError;
use crate::query::eval::{eval, Scope};
use crate::query::expr::{Q, QueryExpr};

use super::index::Index;
use super::record::Record;

/// An immutable filtered projection over a base [`Index`].
///
/// A view is an allow-set plus a handle on the base: queries against it
/// evaluate with the allow-set as their scope, so refining a view never
/// re-scans the base and never touches its structures beyond reads. The
/// allow-set is fixed at creation; records removed from the base afterwards
/// simply drop out of scope. Dropping a view never affects the base.
#[derive(Clone)]
pub struct FilteredView {
    base: Index,
    allow: IntSet<RecordId>,
}

impl FilteredView {
    pub(crate) fn new(base: Index, allow: IntSet<RecordId>) -> Self {
        FilteredView { base, allow }
    }

    /// Number of allowed handles still present in the base.
    pub fn len(&self) -> usize {
        let state = self.base.state().read();
        self.allow.iter().filter(|&&h| state.contains(h)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The allowed records, in ascending handle order.
    pub fn collect(&self) -> Vec<Record> {
        let state = self.base.state().read();
        let mut ids: Vec<RecordId> = self
            .allow
            .iter()
            .copied()
            .filter(|&h| state.contains(h))
            .collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|h| state.record(h).cloned())
            .collect()
    }

    /// Refines this view with a further query.
    pub fn reduced_query(&self, expr: &QueryExpr) -> FilteredView {
        let allow = eval(&self.base.state().read(), expr, Scope::Allow(&self.allow));
        FilteredView::new(self.base.clone(), allow)
    }

    /// Equality-only sugar over [`FilteredView::reduced_query`].
    pub fn reduced(&self, attrs: &[(&str, Atom)]) -> Result<FilteredView, QueryError> {
        Ok(self.reduced_query(&Q::eq_all(attrs)?))
    }

    /// Materializes a fresh, independent [`Index`] by re-registering the
    /// allowed records (base arrival order). The new index tracks the
    /// records' future mutations like any other.
    pub fn rebase(&self) -> Index {
        let members: Vec<Record> = {
            let state = self.base.state().read();
            state
                .records()
                .filter(|record| self.allow.contains(&record.id()))
                .cloned()
                .collect()
        };
        log::trace!("rebasing view of {} records", members.len());
        let out = Index::new();
        out.add_many(members);
        out
    }
}
