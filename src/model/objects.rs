//! Immutable object table shared by pages decoded from one file.

use lopdf::{Object, ObjectId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum reference chain followed by [`ObjectStore::resolve`].
const MAX_RESOLVE_DEPTH: usize = 32;

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique origin tag.
pub(crate) fn next_origin() -> u64 {
    NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed)
}

/// Indirect objects of a decoded PDF, keyed by their original object id.
///
/// The `origin` tag distinguishes stores from different files so that the
/// writer can deduplicate shared objects within one source without mixing
/// up ids from another.
#[derive(Debug)]
pub struct ObjectStore {
    origin: u64,
    objects: BTreeMap<ObjectId, Object>,
}

impl ObjectStore {
    /// Wrap the objects of a freshly loaded file.
    pub fn new(objects: BTreeMap<ObjectId, Object>) -> Arc<Self> {
        Arc::new(Self {
            origin: next_origin(),
            objects,
        })
    }

    /// A store with no objects, for synthesized pages.
    pub fn empty() -> Arc<Self> {
        Self::new(BTreeMap::new())
    }

    /// Origin tag of this store.
    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Look up an object by id.
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    /// Number of objects in the store.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store has no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Follow references until a direct object is reached.
    ///
    /// Dangling or overly long chains resolve to `None`.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        let mut current = obj;
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current {
                Object::Reference(id) => current = self.objects.get(id)?,
                other => return Some(other),
            }
        }
        None
    }
}
