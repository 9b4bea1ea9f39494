use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use facetdb_primitives::RecordId;
use facetdb_value::Atom;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::{SharedState, WeakState};

/// Handles are process-global so a record can move between indexes without
/// ever being re-identified.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// A record: a stable identity plus a sealed bag of named attributes.
///
/// `Record` is a cheap cloneable handle; clones share the same identity and
/// bag. All mutation goes through [`Record::set`] / [`Record::unset`], which
/// update the bag and then report the change to every index the record is
/// registered in. Attribute names starting with `_` are stored but never
/// indexed.
///
/// Equality is identity: two records are equal iff they have the same
/// handle.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

struct RecordInner {
    id: RecordId,
    attrs: Mutex<IndexMap<Box<str>, Atom>>,
    /// Weak links back into the states of the indexes this record is
    /// registered in. The engine side holds the strong reference to the
    /// record; keeping these weak means tearing down an index silently
    /// unhooks its records.
    observers: Mutex<SmallVec<[WeakState; 1]>>,
}

impl Record {
    pub fn new() -> Self {
        Self::with_attrs(core::iter::empty::<(Box<str>, Atom)>())
    }

    pub fn with_attrs<N, V>(attrs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<Box<str>>,
        V: Into<Atom>,
    {
        let id = RecordId(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
        let attrs = attrs.into_iter().map(|(n, v)| (n.into(), v.into())).collect();
        Record {
            inner: Arc::new(RecordInner {
                id,
                attrs: Mutex::new(attrs),
                observers: Mutex::new(SmallVec::new()),
            }),
        }
    }

    /// The engine-assigned handle.
    pub fn id(&self) -> RecordId {
        self.inner.id
    }

    /// The current value of `name`, if set.
    pub fn get(&self, name: &str) -> Option<Atom> {
        self.inner.attrs.lock().get(name).cloned()
    }

    /// Sets `name` to `value` and reports the write to every index this
    /// record is registered in.
    pub fn set(&self, name: &str, value: impl Into<Atom>) {
        let value = value.into();
        self.inner.attrs.lock().insert(name.into(), value.clone());
        self.notify(name, Some(value));
    }

    /// Deletes `name`, reporting the removal. Returns whether it was set.
    pub fn unset(&self, name: &str) -> bool {
        let removed = self.inner.attrs.lock().shift_remove(name).is_some();
        if removed {
            self.notify(name, None);
        }
        removed
    }

    /// The registration-time attribute iterator: a snapshot of the bag,
    /// omitting names that start with `_`.
    pub fn attributes(&self) -> Vec<(Box<str>, Atom)> {
        self.inner
            .attrs
            .lock()
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Reports a write to every live observer.
    ///
    /// The bag lock is never held here and the observer lock is released
    /// before any index lock is taken, so registration (which holds an index
    /// lock while reading the bag) cannot deadlock against a concurrent
    /// mutation.
    fn notify(&self, name: &str, new: Option<Atom>) {
        let sinks: SmallVec<[SharedState; 1]> = {
            let mut observers = self.inner.observers.lock();
            observers.retain(|weak| weak.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for sink in sinks {
            sink.write().apply_set(self.id(), name, new.clone());
        }
    }

    pub(crate) fn install_observer(&self, state: &SharedState) {
        let mut observers = self.inner.observers.lock();
        if !observers.iter().any(|weak| weak.as_ptr() == Arc::as_ptr(state)) {
            observers.push(Arc::downgrade(state));
        }
    }

    pub(crate) fn uninstall_observer(&self, state: &SharedState) {
        self.inner
            .observers
            .lock()
            .retain(|weak| weak.as_ptr() != Arc::as_ptr(state));
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({})", self.id())
    }
}

impl From<&Record> for Atom {
    fn from(record: &Record) -> Self {
        Atom::Ref(record.id())
    }
}
