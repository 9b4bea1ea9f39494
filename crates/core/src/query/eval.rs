use core::ops::Bound;

use decorum::Total;
use facetdb_primitives::{AttrId, IntSet, RecordId};
use facetdb_value::Atom;
use itertools::Itertools;

use crate::db::attr_index::range_key;
use crate::db::state::IndexState;
use crate::query::expr::{CmpOp, QueryExpr};

/// The set of handles an evaluation is restricted to: a whole index, or a
/// view's allow-set.
#[derive(Copy, Clone)]
pub(crate) enum Scope<'a> {
    Full,
    Allow(&'a IntSet<RecordId>),
}

impl Scope<'_> {
    fn contains(&self, state: &IndexState, h: RecordId) -> bool {
        match self {
            Scope::Full => state.contains(h),
            // An allow-set can hold handles removed from the base since the
            // view was built; they are no longer in scope.
            Scope::Allow(allow) => allow.contains(&h) && state.contains(h),
        }
    }

    fn to_set(&self, state: &IndexState) -> IntSet<RecordId> {
        match self {
            Scope::Full => state.handles().collect(),
            Scope::Allow(allow) => allow
                .iter()
                .copied()
                .filter(|&h| state.contains(h))
                .collect(),
        }
    }

    /// An upper bound on the scope size, cheap enough for cost estimates.
    fn len(&self, state: &IndexState) -> usize {
        match self {
            Scope::Full => state.len(),
            Scope::Allow(allow) => allow.len(),
        }
    }
}

/// Evaluates `expr` to the matching handles within `scope`.
pub(crate) fn eval(state: &IndexState, expr: &QueryExpr, scope: Scope<'_>) -> IntSet<RecordId> {
    match expr {
        QueryExpr::All => scope.to_set(state),
        QueryExpr::None => IntSet::default(),
        QueryExpr::Eq(path, value) => {
            eval_leaf(state, path.segments(), scope, &|state, attr, scope| {
                postings(state, attr, value, scope)
            })
        }
        QueryExpr::Ne(path, value) => {
            let matched = eval_leaf(state, path.segments(), scope, &|state, attr, scope| {
                postings(state, attr, value, scope)
            });
            let mut out = scope.to_set(state);
            out.retain(|h| !matched.contains(h));
            out
        }
        QueryExpr::In(path, values) => {
            let mut out = IntSet::default();
            for value in values {
                out.extend(eval_leaf(state, path.segments(), scope, &|state, attr, scope| {
                    postings(state, attr, value, scope)
                }));
            }
            out
        }
        QueryExpr::Cmp(path, op, bound) => {
            let range = cmp_bounds(*op, *bound);
            eval_leaf(state, path.segments(), scope, &|state, attr, scope| {
                range_postings(state, attr, &range, scope)
            })
        }
        QueryExpr::Between(path, lo, hi) => {
            let range = (
                Bound::Included(range_key(*lo)),
                Bound::Included(range_key(*hi)),
            );
            eval_leaf(state, path.segments(), scope, &|state, attr, scope| {
                range_postings(state, attr, &range, scope)
            })
        }
        QueryExpr::Not(inner) => {
            let matched = eval(state, inner, scope);
            let mut out = scope.to_set(state);
            out.retain(|h| !matched.contains(h));
            out
        }
        QueryExpr::And(children) => {
            if children.is_empty() {
                return scope.to_set(state);
            }
            // Cheapest child first, then every later child evaluates with
            // the running intersection as its scope, so the conjunction
            // narrows as it goes and stops dead on an empty set.
            let scope_len = scope.len(state);
            let ordered = children
                .iter()
                .sorted_by_key(|child| estimate(state, child, scope_len))
                .collect::<Vec<_>>();
            let mut running = eval(state, ordered[0], scope);
            for child in &ordered[1..] {
                if running.is_empty() {
                    break;
                }
                running = eval(state, child, Scope::Allow(&running));
            }
            running
        }
        QueryExpr::Or(children) => {
            let mut out = IntSet::default();
            for child in children {
                out.extend(eval(state, child, scope));
            }
            out
        }
    }
}

/// Resolves a (possibly dotted) leaf: the single-segment case consults the
/// attribute's structures through `direct`; a longer path evaluates its tail
/// over the full index and walks the reverse edges back to the parents in
/// scope. Depth-first on the path, never on the graph, so reference cycles
/// terminate trivially.
fn eval_leaf<F>(
    state: &IndexState,
    segments: &[Box<str>],
    scope: Scope<'_>,
    direct: &F,
) -> IntSet<RecordId>
where
    F: Fn(&IndexState, AttrId, Scope<'_>) -> IntSet<RecordId>,
{
    let Some((head, tail)) = segments.split_first() else {
        return IntSet::default();
    };
    let Some(attr) = state.attr_id(head) else {
        // Unknown attribute: empty, not an error.
        return IntSet::default();
    };
    if tail.is_empty() {
        return direct(state, attr, scope);
    }
    let children = eval_leaf(state, tail, Scope::Full, direct);
    let mut out = IntSet::default();
    for &child in &children {
        for &(parent, via) in state.edges().referrers(child) {
            if via == attr && scope.contains(state, parent) {
                out.insert(parent);
            }
        }
    }
    out
}

fn postings(state: &IndexState, attr: AttrId, value: &Atom, scope: Scope<'_>) -> IntSet<RecordId> {
    let Some(ai) = state.attr_index(attr) else {
        return IntSet::default();
    };
    ai.seek_eq(value)
        .iter()
        .copied()
        .filter(|&h| scope.contains(state, h))
        .collect()
}

fn range_postings(
    state: &IndexState,
    attr: AttrId,
    range: &(Bound<Total<f64>>, Bound<Total<f64>>),
    scope: Scope<'_>,
) -> IntSet<RecordId> {
    let Some(ai) = state.attr_index(attr) else {
        return IntSet::default();
    };
    ai.seek_range(range)
        .copied()
        .filter(|&h| scope.contains(state, h))
        .collect()
}

fn cmp_bounds(op: CmpOp, bound: f64) -> (Bound<Total<f64>>, Bound<Total<f64>>) {
    let bound = range_key(bound);
    match op {
        CmpOp::Gt => (Bound::Excluded(bound), Bound::Unbounded),
        CmpOp::Ge => (Bound::Included(bound), Bound::Unbounded),
        CmpOp::Lt => (Bound::Unbounded, Bound::Excluded(bound)),
        CmpOp::Le => (Bound::Unbounded, Bound::Included(bound)),
    }
}

/// A cheap upper-ish bound on a child's result size, used only to order
/// `And` children. Exactness doesn't matter; never under-counting an empty
/// posting list does, so unknown attributes estimate to zero and get
/// evaluated first.
fn estimate(state: &IndexState, expr: &QueryExpr, scope_len: usize) -> usize {
    match expr {
        QueryExpr::All | QueryExpr::Ne(..) | QueryExpr::Not(_) => scope_len,
        QueryExpr::None => 0,
        QueryExpr::Eq(path, value) => eq_estimate(state, path.segments(), value),
        QueryExpr::In(path, values) => values
            .iter()
            .map(|value| eq_estimate(state, path.segments(), value))
            .sum::<usize>()
            .min(scope_len),
        QueryExpr::Cmp(path, _, _) | QueryExpr::Between(path, _, _) => {
            numeric_estimate(state, path.segments()).min(scope_len)
        }
        QueryExpr::And(children) => children
            .iter()
            .map(|child| estimate(state, child, scope_len))
            .min()
            .unwrap_or(scope_len),
        QueryExpr::Or(children) => children
            .iter()
            .map(|child| estimate(state, child, scope_len))
            .sum::<usize>()
            .min(scope_len),
    }
}

/// Cost of a leaf is driven by its tail: the dotted rewrite evaluates the
/// last segment's predicate first and maps backwards through the edges.
fn eq_estimate(state: &IndexState, segments: &[Box<str>], value: &Atom) -> usize {
    tail_attr(state, segments).map_or(0, |attr| {
        state.attr_index(attr).map_or(0, |ai| ai.len_eq(value))
    })
}

fn numeric_estimate(state: &IndexState, segments: &[Box<str>]) -> usize {
    tail_attr(state, segments).map_or(0, |attr| {
        state.attr_index(attr).map_or(0, |ai| ai.num_numeric())
    })
}

fn tail_attr(state: &IndexState, segments: &[Box<str>]) -> Option<AttrId> {
    segments.last().and_then(|name| state.attr_id(name))
}
