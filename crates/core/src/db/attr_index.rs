use core::ops::RangeBounds;

use decorum::Total;
use facetdb_primitives::RecordId;
use facetdb_value::Atom;
use indexmap::IndexMap;
use smallvec::SmallVec;

use super::multimap::{MultiMap, MultiMapRangeIter};

/// An iterator over the handles whose numeric value falls in a key range.
/// Ordering across the iterator is unspecified.
pub(crate) type RangeSeekIter<'a> = MultiMapRangeIter<'a, Total<f64>, RecordId>;

/// The range-map key for a numeric value. Signed zero is collapsed so the
/// total order used by the map agrees with numeric comparison at zero.
pub(crate) fn range_key(value: f64) -> Total<f64> {
    Total::from(if value == 0.0 { 0.0 } else { value })
}

/// The range-map key of an atom, if it has one. NaN compares false against
/// everything, so NaN values stay out of the range map entirely (they still
/// answer equality).
fn range_indexable(value: &Atom) -> Option<Total<f64>> {
    value.as_f64().filter(|v| !v.is_nan()).map(range_key)
}

/// The index structures for a single attribute.
///
/// `eq` is the posting-list map: every current `(value, handle)` pair of the
/// attribute has the handle in the value's posting list, and nothing else
/// does. Cross-variant numeric equality is carried by `Atom`'s `Eq`/`Hash`,
/// so `I64(30)` and `F64(30.0)` share one posting list.
///
/// `range` holds only the numeric values, keyed by the value cast to `f64`;
/// ties share a bucket. Non-numeric values are invisible to range seeks but
/// still answer equality.
#[derive(Default)]
pub(crate) struct AttrIndex {
    eq: IndexMap<Atom, SmallVec<[RecordId; 1]>>,
    range: MultiMap<Total<f64>, RecordId>,
}

impl AttrIndex {
    /// Adds `h` under `value`.
    ///
    /// Panics if the pair is already present: the dispatcher only inserts
    /// what it has not inserted before, so a duplicate means the posting
    /// lists no longer agree with the snapshots and no further answer can
    /// be trusted.
    #[tracing::instrument(skip_all)]
    pub(crate) fn insert(&mut self, value: &Atom, h: RecordId) {
        let vset = self.eq.entry(value.clone()).or_default();
        let Err(idx) = vset.binary_search(&h) else {
            panic!("posting list inconsistency: duplicate insert of {h} under {value}");
        };
        vset.insert(idx, h);
        if let Some(key) = range_indexable(value) {
            self.range.insert(key, h);
        }
    }

    /// Removes `h` from under `value`, pruning emptied posting lists.
    ///
    /// Panics if the pair is absent, for the same reason `insert` panics on
    /// a duplicate.
    #[tracing::instrument(skip_all)]
    pub(crate) fn delete(&mut self, value: &Atom, h: RecordId) {
        let Some(vset) = self.eq.get_mut(value) else {
            panic!("posting list inconsistency: delete of absent {h} under {value}");
        };
        let Ok(idx) = vset.binary_search(&h) else {
            panic!("posting list inconsistency: delete of absent {h} under {value}");
        };
        // Maintain the sorted order. Don't use `swap_remove`!
        vset.remove(idx);
        if vset.is_empty() {
            self.eq.swap_remove(value);
        }
        if let Some(key) = range_indexable(value) {
            self.range.delete(&key, &h);
        }
    }

    /// The posting list for `value`, borrowed. Empty when the value was
    /// never seen.
    #[tracing::instrument(skip_all)]
    pub(crate) fn seek_eq(&self, value: &Atom) -> &[RecordId] {
        self.eq.get(value).map(SmallVec::as_slice).unwrap_or_default()
    }

    /// Streams the handles whose numeric key falls within `range`.
    #[tracing::instrument(skip_all)]
    pub(crate) fn seek_range(&self, range: &impl RangeBounds<Total<f64>>) -> RangeSeekIter<'_> {
        self.range.values_in_range(range)
    }

    /// Posting-list length for `value`, used for cost estimation.
    pub(crate) fn len_eq(&self, value: &Atom) -> usize {
        self.eq.get(value).map_or(0, |vset| vset.len())
    }

    /// Number of numeric entries, an upper bound for any range seek.
    pub(crate) fn num_numeric(&self) -> usize {
        self.range.len()
    }

    #[allow(unused)] // Exercised by the state-level consistency checks in tests.
    pub(crate) fn is_empty(&self) -> bool {
        self.eq.is_empty() && self.range.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ops::Bound;

    fn seek(ai: &AttrIndex, lo: Bound<f64>, hi: Bound<f64>) -> Vec<RecordId> {
        let map = |b: Bound<f64>| match b {
            Bound::Included(x) => Bound::Included(Total::from(x)),
            Bound::Excluded(x) => Bound::Excluded(Total::from(x)),
            Bound::Unbounded => Bound::Unbounded,
        };
        let mut out: Vec<_> = ai.seek_range(&(map(lo), map(hi))).copied().collect();
        out.sort();
        out
    }

    #[test]
    fn eq_and_range_stay_in_step() {
        let mut ai = AttrIndex::default();
        ai.insert(&Atom::I64(30), RecordId(1));
        ai.insert(&Atom::from(30.0), RecordId(2));
        ai.insert(&Atom::from("x"), RecordId(3));

        // One posting list for the numerically equal pair.
        assert_eq!(ai.seek_eq(&Atom::I64(30)), &[RecordId(1), RecordId(2)]);
        assert_eq!(ai.len_eq(&Atom::from(30.0)), 2);
        // Strings answer equality but not ranges.
        assert_eq!(ai.seek_eq(&Atom::from("x")), &[RecordId(3)]);
        assert_eq!(ai.num_numeric(), 2);
        assert_eq!(
            seek(&ai, Bound::Included(30.0), Bound::Included(30.0)),
            vec![RecordId(1), RecordId(2)]
        );

        ai.delete(&Atom::I64(30), RecordId(1));
        assert_eq!(ai.seek_eq(&Atom::I64(30)), &[RecordId(2)]);
        assert_eq!(seek(&ai, Bound::Unbounded, Bound::Excluded(31.0)), vec![RecordId(2)]);

        ai.delete(&Atom::from(30.0), RecordId(2));
        ai.delete(&Atom::from("x"), RecordId(3));
        assert!(ai.is_empty());
    }

    #[test]
    fn range_bounds_are_respected() {
        let mut ai = AttrIndex::default();
        ai.insert(&Atom::I64(10), RecordId(1));
        ai.insert(&Atom::I64(20), RecordId(2));
        ai.insert(&Atom::I64(30), RecordId(3));

        assert_eq!(
            seek(&ai, Bound::Excluded(10.0), Bound::Unbounded),
            vec![RecordId(2), RecordId(3)]
        );
        assert_eq!(seek(&ai, Bound::Unbounded, Bound::Excluded(20.0)), vec![RecordId(1)]);
        assert_eq!(
            seek(&ai, Bound::Included(10.0), Bound::Included(20.0)),
            vec![RecordId(1), RecordId(2)]
        );
    }

    #[test]
    fn nan_answers_equality_but_no_range() {
        let mut ai = AttrIndex::default();
        ai.insert(&Atom::from(f64::NAN), RecordId(1));
        assert_eq!(ai.seek_eq(&Atom::from(f64::NAN)), &[RecordId(1)]);
        assert_eq!(ai.num_numeric(), 0);
        assert!(seek(&ai, Bound::Unbounded, Bound::Unbounded).is_empty());
        ai.delete(&Atom::from(f64::NAN), RecordId(1));
        assert!(ai.is_empty());
    }

    #[test]
    #[should_panic(expected = "posting list inconsistency")]
    fn deleting_an_absent_pair_is_fatal() {
        let mut ai = AttrIndex::default();
        ai.insert(&Atom::I64(1), RecordId(1));
        ai.delete(&Atom::I64(2), RecordId(1));
    }
}
