pub(crate) mod attr_index;
pub(crate) mod edges;
pub mod index;
pub(crate) mod multimap;
pub mod record;
pub(crate) mod state;
pub mod view;

use parking_lot::RwLock;
use std::sync::{Arc, Weak};

use state::IndexState;

/// The shared, lock-protected state of one [`index::Index`].
pub(crate) type SharedState = Arc<RwLock<IndexState>>;

/// A record's weak back-link into an index it is registered in.
pub(crate) type WeakState = Weak<RwLock<IndexState>>;
