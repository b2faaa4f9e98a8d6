//! Validation cache
//!
//! Keyed by (cluster, namespace, kind, name); populated by the orchestrator
//! after each pass; serves point queries and bulk listings to the HTTP
//! layer. A single reader-writer lock guards the map; `replace` swaps the
//! whole map in one exclusive critical section so readers never observe a
//! partially updated pass. A monotonically increasing version counter lets
//! downstream callers detect change cheaply.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::models::{ObjectValidation, ValidationKey, Validations};

/// Thread-safe store of the most recent validation results
#[derive(Debug, Default)]
pub struct ValidationCache {
    entries: RwLock<BTreeMap<ValidationKey, Arc<ObjectValidation>>>,
    version: AtomicU64,
}

impl ValidationCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Point lookup; the returned handle is immutable and cheap to clone
    pub fn get(&self, key: &ValidationKey) -> Option<Arc<ObjectValidation>> {
        self.entries
            .read()
            .expect("validation cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Snapshot copy of the whole map, safe to iterate without locking
    pub fn items(&self) -> Validations {
        let entries = self
            .entries
            .read()
            .expect("validation cache lock poisoned");
        Validations(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), (**v).clone()))
                .collect(),
        )
    }

    /// Insert or overwrite one entry
    pub fn set(&self, key: ValidationKey, value: ObjectValidation) {
        self.entries
            .write()
            .expect("validation cache lock poisoned")
            .insert(key, Arc::new(value));
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Atomically swap the whole map; used after a full refresh
    pub fn replace(&self, validations: Validations) {
        let map: BTreeMap<ValidationKey, Arc<ObjectValidation>> = validations
            .0
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();
        *self
            .entries
            .write()
            .expect("validation cache lock poisoned") = map;
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Current cache version; bumped on every mutation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("validation cache lock poisoned")
            .len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlens_common::mesh::ObjectKind;

    fn key(name: &str) -> ValidationKey {
        ValidationKey {
            cluster: "east".into(),
            namespace: "bookinfo".into(),
            kind: ObjectKind::VirtualService,
            name: name.into(),
        }
    }

    #[test]
    fn set_and_get_round_trip() {
        let cache = ValidationCache::new();
        assert!(cache.get(&key("reviews")).is_none());

        cache.set(key("reviews"), ObjectValidation::valid());
        let entry = cache.get(&key("reviews")).unwrap();
        assert!(entry.valid);
    }

    #[test]
    fn version_increases_on_every_mutation() {
        let cache = ValidationCache::new();
        let v0 = cache.version();
        cache.set(key("a"), ObjectValidation::valid());
        let v1 = cache.version();
        assert!(v1 > v0);
        cache.replace(Validations::new());
        assert!(cache.version() > v1);
    }

    #[test]
    fn replace_swaps_the_whole_map() {
        let cache = ValidationCache::new();
        cache.set(key("stale"), ObjectValidation::valid());

        let mut fresh = Validations::new();
        fresh.ensure(key("fresh"));
        cache.replace(fresh);

        assert!(cache.get(&key("stale")).is_none());
        assert!(cache.get(&key("fresh")).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn items_returns_detached_copy() {
        let cache = ValidationCache::new();
        cache.set(key("reviews"), ObjectValidation::valid());
        let copy = cache.items();
        cache.replace(Validations::new());
        // The copy is unaffected by the swap
        assert_eq!(copy.len(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let cache = Arc::new(ValidationCache::new());
        let mut handles = Vec::new();
        for i in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    cache.set(key(&format!("vs-{i}-{j}")), ObjectValidation::valid());
                    let _ = cache.items();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 200);
        assert_eq!(cache.version(), 200);
    }
}
