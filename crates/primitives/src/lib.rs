//! Plain-old-data identifiers shared across the facetdb crates.
//!
//! Everything addressable by the engine is addressed through a newtype here,
//! never through a raw integer or a string: records by [`RecordId`],
//! interned attribute names by [`AttrId`].

use core::fmt;
use std::collections::{HashMap, HashSet};

/// The engine-assigned identity of a record.
///
/// Handles are allocated from a single monotonically increasing counter, so
/// they are unique for the lifetime of the process and ordering by handle is
/// ordering by creation time. Record equality throughout the engine is
/// equality of handles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

impl nohash_hasher::IsEnabled for RecordId {}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        RecordId(id)
    }
}

/// An interned attribute name, local to one `Index`.
///
/// Attribute names are interned on first sight and addressed as `AttrId`
/// everywhere past the public surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrId(pub u32);

impl nohash_hasher::IsEnabled for AttrId {}

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attr{}", self.0)
    }
}

impl From<u32> for AttrId {
    fn from(id: u32) -> Self {
        AttrId(id)
    }
}

/// A `HashMap` keyed by an id newtype, skipping the hashing step.
pub type IntMap<K, V> = HashMap<K, V, nohash_hasher::BuildNoHashHasher<K>>;

/// A `HashSet` of an id newtype, skipping the hashing step.
pub type IntSet<K> = HashSet<K, nohash_hasher::BuildNoHashHasher<K>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_orders_by_allocation() {
        assert!(RecordId(1) < RecordId(2));
        assert_eq!(RecordId(7).to_string(), "#7");
    }

    #[test]
    fn int_set_roundtrip() {
        let mut set = IntSet::default();
        set.insert(RecordId(3));
        assert!(set.contains(&RecordId(3)));
        assert!(!set.contains(&RecordId(4)));
    }
}
