use facetdb_primitives::{AttrId, IntMap, RecordId};
use smallvec::SmallVec;
use std::collections::HashMap;

/// The directed reference graph between registered records.
///
/// A forward edge `(parent, attr) -> child` exists while the parent's
/// current value of `attr` is a reference to a live child; the reverse map
/// mirrors it exactly. Reverse entries are what path evaluation walks: a
/// dotted path is resolved by looking up the referrers of the records that
/// matched the tail, never by recursing into the graph.
#[derive(Default)]
pub(crate) struct EdgeTable {
    forward: HashMap<(RecordId, AttrId), RecordId>,
    reverse: IntMap<RecordId, SmallVec<[(RecordId, AttrId); 1]>>,
}

impl EdgeTable {
    /// Records the edge `(parent, attr) -> child`.
    pub fn link(&mut self, parent: RecordId, attr: AttrId, child: RecordId) {
        self.forward.insert((parent, attr), child);
        let rset = self.reverse.entry(child).or_default();
        if let Err(idx) = rset.binary_search(&(parent, attr)) {
            rset.insert(idx, (parent, attr));
        }
    }

    /// Drops the edge rooted at `(parent, attr)`, if any.
    ///
    /// Tolerates an already-severed child: destroying a record drops the
    /// mirrored forward entries of its referrers, and those referrers may
    /// later overwrite or delete their dangling attribute.
    pub fn unlink(&mut self, parent: RecordId, attr: AttrId) {
        let Some(child) = self.forward.remove(&(parent, attr)) else {
            return;
        };
        if let Some(rset) = self.reverse.get_mut(&child) {
            if let Ok(idx) = rset.binary_search(&(parent, attr)) {
                rset.remove(idx);
            }
            if rset.is_empty() {
                self.reverse.remove(&child);
            }
        }
    }

    /// Severs every edge pointing at `child`, both directions.
    ///
    /// The referrers keep their now-dangling `Ref` atoms; with the edges
    /// gone, path traversal treats them as unresolved.
    pub fn sever_child(&mut self, child: RecordId) {
        let Some(rset) = self.reverse.remove(&child) else {
            return;
        };
        for (parent, attr) in rset {
            self.forward.remove(&(parent, attr));
        }
    }

    /// The `(parent, attr)` pairs whose reference edge lands on `child`.
    pub fn referrers(&self, child: RecordId) -> &[(RecordId, AttrId)] {
        self.reverse.get(&child).map(SmallVec::as_slice).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: AttrId = AttrId(0);
    const BOSS: AttrId = AttrId(1);

    #[test]
    fn link_unlink_mirror() {
        let mut edges = EdgeTable::default();
        edges.link(RecordId(1), BOSS, RecordId(9));
        edges.link(RecordId(2), BOSS, RecordId(9));
        assert_eq!(
            edges.referrers(RecordId(9)),
            &[(RecordId(1), BOSS), (RecordId(2), BOSS)]
        );

        edges.unlink(RecordId(1), BOSS);
        assert_eq!(edges.referrers(RecordId(9)), &[(RecordId(2), BOSS)]);

        edges.unlink(RecordId(2), BOSS);
        assert!(edges.referrers(RecordId(9)).is_empty());
    }

    #[test]
    fn relinking_an_attr_moves_the_edge() {
        let mut edges = EdgeTable::default();
        edges.link(RecordId(1), BOSS, RecordId(9));
        // Overwrite: the forward slot is replaced, the old reverse entry is
        // cleaned up by the dispatcher's unlink-before-link discipline.
        edges.unlink(RecordId(1), BOSS);
        edges.link(RecordId(1), BOSS, RecordId(8));
        assert!(edges.referrers(RecordId(9)).is_empty());
        assert_eq!(edges.referrers(RecordId(8)), &[(RecordId(1), BOSS)]);
    }

    #[test]
    fn sever_drops_both_directions() {
        let mut edges = EdgeTable::default();
        edges.link(RecordId(1), BOSS, RecordId(9));
        edges.link(RecordId(1), NAME, RecordId(7));
        edges.sever_child(RecordId(9));

        assert!(edges.referrers(RecordId(9)).is_empty());
        // A later unlink of the dangling attr is a no-op, not a panic.
        edges.unlink(RecordId(1), BOSS);
        // Unrelated edges survive.
        assert_eq!(edges.referrers(RecordId(7)), &[(RecordId(1), NAME)]);
    }
}
