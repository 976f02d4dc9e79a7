//! Identity map of cached objects.

use crate::object::CloudObject;
use crate::types::{ClassName, ObjectId};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A cloud object shared between the cache and its users.
pub type SharedObject = Arc<Mutex<CloudObject>>;

type CacheKey = (ClassName, ObjectId);

static GLOBAL: Lazy<Arc<LocalCache>> = Lazy::new(|| Arc::new(LocalCache::new()));

/// Identity map from (class, object id) to a shared object instance.
///
/// Holds at most one live instance per key. There is no size or age based
/// eviction: entries leave only through [`evict`](LocalCache::evict) or
/// [`clear`](LocalCache::clear).
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: Mutex<HashMap<CacheKey, SharedObject>>,
}

impl LocalCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide default cache.
    ///
    /// Nothing in this crate uses it implicitly; pass it to an engine to
    /// share one identity map across the process.
    pub fn global() -> Arc<LocalCache> {
        Arc::clone(&GLOBAL)
    }

    /// Returns a handle to the object `(class_name, object_id)`.
    ///
    /// With `use_cache`, returns the cached instance, creating and caching a
    /// placeholder if there is none; insert-if-absent is atomic, so
    /// concurrent callers always receive the same instance. Without it,
    /// returns a fresh placeholder and leaves the cache untouched.
    /// Never performs I/O.
    pub fn reference(&self, class_name: &ClassName, object_id: ObjectId, use_cache: bool) -> SharedObject {
        if !use_cache {
            return Arc::new(Mutex::new(CloudObject::existing(class_name.clone(), object_id)));
        }
        let mut entries = self.entries.lock();
        Arc::clone(
            entries
                .entry((class_name.clone(), object_id))
                .or_insert_with(|| {
                    debug!(class = %class_name, id = %object_id, "caching placeholder");
                    Arc::new(Mutex::new(CloudObject::existing(class_name.clone(), object_id)))
                }),
        )
    }

    /// Caches `object` under `(class_name, object_id)` unless an instance is
    /// already cached there, and returns the cached instance.
    pub fn insert(&self, class_name: &ClassName, object_id: ObjectId, object: SharedObject) -> SharedObject {
        let mut entries = self.entries.lock();
        Arc::clone(
            entries
                .entry((class_name.clone(), object_id))
                .or_insert_with(|| {
                    debug!(class = %class_name, id = %object_id, "caching saved object");
                    object
                }),
        )
    }

    /// Returns the cached instance, if any.
    pub fn get(&self, class_name: &ClassName, object_id: ObjectId) -> Option<SharedObject> {
        self.entries
            .lock()
            .get(&(class_name.clone(), object_id))
            .cloned()
    }

    /// Removes one entry. Handles already given out stay valid.
    pub fn evict(&self, class_name: &ClassName, object_id: ObjectId) -> Option<SharedObject> {
        self.entries.lock().remove(&(class_name.clone(), object_id))
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        debug!(count = entries.len(), "clearing object cache");
        entries.clear();
    }

    /// Number of cached objects.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn game() -> ClassName {
        ClassName::new("game").unwrap()
    }

    #[test]
    fn cached_reference_is_shared() {
        let cache = LocalCache::new();
        let id = ObjectId::generate();

        let a = cache.reference(&game(), id, true);
        let b = cache.reference(&game(), id, true);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        a.lock().set("score", 1).unwrap();
        assert_eq!(b.lock().get("score"), Some(&cirrus_codec::Value::Int32(1)));
    }

    #[test]
    fn uncached_reference_is_fresh() {
        let cache = LocalCache::new();
        let id = ObjectId::generate();

        let cached = cache.reference(&game(), id, true);
        let fresh = cache.reference(&game(), id, false);
        assert!(!Arc::ptr_eq(&cached, &fresh));
        assert_eq!(fresh.lock().object_id(), Some(id));

        let other = LocalCache::new();
        other.reference(&game(), id, false);
        assert!(other.is_empty());
    }

    #[test]
    fn insert_keeps_the_first_instance() {
        let cache = LocalCache::new();
        let id = ObjectId::generate();
        let first: SharedObject = Arc::new(Mutex::new(CloudObject::existing(game(), id)));
        let second: SharedObject = Arc::new(Mutex::new(CloudObject::existing(game(), id)));

        assert!(Arc::ptr_eq(&cache.insert(&game(), id, Arc::clone(&first)), &first));
        assert!(Arc::ptr_eq(&cache.insert(&game(), id, second), &first));
        assert!(Arc::ptr_eq(&cache.reference(&game(), id, true), &first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn classes_do_not_share_entries() {
        let cache = LocalCache::new();
        let id = ObjectId::generate();
        let a = cache.reference(&game(), id, true);
        let b = cache.reference(&ClassName::new("player").unwrap(), id, true);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn evict_and_clear() {
        let cache = LocalCache::new();
        let id = ObjectId::generate();
        let held = cache.reference(&game(), id, true);

        assert!(cache.evict(&game(), id).is_some());
        assert!(cache.get(&game(), id).is_none());
        let again = cache.reference(&game(), id, true);
        assert!(!Arc::ptr_eq(&held, &again));

        cache.reference(&game(), ObjectId::generate(), true);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_references_construct_one_instance() {
        const THREADS: usize = 16;
        let cache = LocalCache::new();
        let id = ObjectId::generate();
        let barrier = Barrier::new(THREADS);

        let handles: Vec<SharedObject> = thread::scope(|s| {
            let workers: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.reference(&game(), id, true)
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(cache.len(), 1);
        let first = &handles[0];
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, first)));
        // cache entry plus one handle per thread
        assert_eq!(Arc::strong_count(first), THREADS + 1);
    }

    #[test]
    fn global_is_a_single_instance() {
        assert!(Arc::ptr_eq(&LocalCache::global(), &LocalCache::global()));
    }
}
