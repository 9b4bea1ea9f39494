use core::ops::RangeBounds;
use core::slice;
use smallvec::SmallVec;
use std::collections::btree_map::{BTreeMap, Range};

/// A multi map relating an ordered `K` to a *set* of `V`s.
///
/// Backed by a `BTreeMap` so that key ranges can be scanned in order. A
/// value set is stored as a *sorted* `SmallVec` with one inline element,
/// which keeps the common one-value-per-key case allocation-free. Buckets
/// that become empty are pruned so the key space never outgrows the live
/// entries.
pub(crate) struct MultiMap<K, V> {
    map: BTreeMap<K, SmallVec<[V; 1]>>,
}

impl<K, V> Default for MultiMap<K, V> {
    fn default() -> Self {
        MultiMap {
            map: BTreeMap::new(),
        }
    }
}

impl<K: Ord, V: Ord + Copy> MultiMap<K, V> {
    /// Inserts the relation `key -> val`.
    ///
    /// Returns false if `key -> val` was already present.
    pub fn insert(&mut self, key: K, val: V) -> bool {
        let vset = self.map.entry(key).or_default();
        // Binary search keeps the set sorted and detects duplicates in
        // O(log(vset.len())).
        let Err(idx) = vset.binary_search(&val) else {
            return false;
        };
        vset.insert(idx, val);
        true
    }

    /// Deletes `key -> val`, pruning the bucket if it empties.
    ///
    /// Returns whether `key -> val` was present.
    pub fn delete(&mut self, key: &K, val: &V) -> bool {
        let Some(vset) = self.map.get_mut(key) else {
            return false;
        };
        let Ok(idx) = vset.binary_search(val) else {
            return false;
        };
        // Maintain the sorted order. Don't use `swap_remove`!
        vset.remove(idx);
        if vset.is_empty() {
            self.map.remove(key);
        }
        true
    }

    /// An iterator over all the `V`s whose `K` falls within `range`.
    pub fn values_in_range(&self, range: &impl RangeBounds<K>) -> MultiMapRangeIter<'_, K, V> {
        MultiMapRangeIter {
            outer: self.map.range((range.start_bound(), range.end_bound())),
            inner: None,
        }
    }

    /// The number of distinct keys.
    #[allow(unused)] // No use for this currently.
    pub fn num_keys(&self) -> usize {
        self.map.len()
    }

    /// The total number of entries.
    pub fn len(&self) -> usize {
        self.map.values().map(|vset| vset.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// An iterator over values in a [`MultiMap`] where the keys are in a certain
/// range.
pub(crate) struct MultiMapRangeIter<'a, K, V> {
    /// The outer iterator seeking for matching keys in the range.
    outer: Range<'a, K, SmallVec<[V; 1]>>,
    /// The inner iterator for the value set of a found key.
    inner: Option<slice::Iter<'a, V>>,
}

impl<'a, K, V> Iterator for MultiMapRangeIter<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(inner) = self.inner.as_mut() {
                if let Some(val) = inner.next() {
                    return Some(val);
                }
            }

            // This makes the iterator fused.
            self.inner = None;
            let (_, next) = self.outer.next()?;
            self.inner = Some(next.iter());
        }
    }
}
