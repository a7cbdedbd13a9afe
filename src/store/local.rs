//! In-process cache store, grounded in the teacher's `QueryCache` entry
//! bookkeeping (`created_at`/`ttl`/`last_accessed`) and `CacheInvalidator`'s
//! table-to-keys reverse index, rebuilt on `dashmap` for lock-free
//! concurrent access from every query path.

use super::{ExpirationPolicy, Store};
use crate::error::Result;
use crate::key::Fingerprint;
use crate::model::{ResultSet, Tag};
use crate::telemetry::Counters;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry {
    value: Arc<ResultSet>,
    tags: HashSet<Tag>,
    created_at: Instant,
    absolute_expires_at: Option<Instant>,
    sliding_ttl: Option<Duration>,
    /// Stamped with the store's generation counter at insertion time;
    /// an `InvalidateAll` bumps the counter instead of walking every
    /// entry, and reads lazily treat a stale generation as a miss.
    generation: u64,
    last_accessed: Mutex<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant, current_generation: u64) -> bool {
        if self.generation < current_generation {
            return true;
        }
        if let Some(expires_at) = self.absolute_expires_at {
            if now >= expires_at {
                return true;
            }
        }
        if let Some(sliding) = self.sliding_ttl {
            let last = *self.last_accessed.lock();
            if now.duration_since(last) >= sliding {
                return true;
            }
        }
        false
    }

    fn touch(&self, now: Instant) {
        if self.sliding_ttl.is_some() {
            *self.last_accessed.lock() = now;
        }
    }

    fn approx_size(&self) -> u64 {
        self.value.approx_byte_size
    }
}

/// A single-process cache store. Tag membership is tracked in a reverse
/// index (`tag -> keys`) so `invalidate_by_tags` never scans the full
/// key space, matching the shape of the teacher's `table_to_keys` map.
pub struct LocalStore {
    entries: DashMap<Fingerprint, Entry>,
    tag_index: DashMap<Tag, HashSet<Fingerprint>>,
    generation: AtomicU64,
    counters: Arc<Counters>,
    /// Serializes the tag-removal -> tag-install -> map-insert sequence in
    /// `set` (and the matching removal sequence in the invalidation
    /// methods) so a reader never observes the tag index and the entry
    /// map disagreeing about a key mid-write. `DashMap`'s own per-shard
    /// locking covers each map individually, not the pair of them.
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            entries: DashMap::new(),
            tag_index: DashMap::new(),
            generation: AtomicU64::new(0),
            counters,
            write_lock: Mutex::new(()),
        }
    }

    fn remove_from_tag_index(&self, key: &Fingerprint, tags: &HashSet<Tag>) {
        for tag in tags {
            if let Some(mut keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    drop(keys);
                    self.tag_index.remove(tag);
                }
            }
        }
    }
}

impl Store for LocalStore {
    fn get(&self, key: &Fingerprint) -> Result<Option<Arc<ResultSet>>> {
        let now = Instant::now();
        let current_generation = self.generation.load(Ordering::Acquire);

        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };

        if entry.is_expired(now, current_generation) {
            let tags = entry.tags.clone();
            drop(entry);
            let _guard = self.write_lock.lock();
            self.entries.remove(key);
            self.remove_from_tag_index(key, &tags);
            return Ok(None);
        }

        entry.touch(now);
        Ok(Some(entry.value.clone()))
    }

    fn set(
        &self,
        key: Fingerprint,
        tags: HashSet<Tag>,
        value: Arc<ResultSet>,
        expiration: ExpirationPolicy,
    ) -> Result<()> {
        let now = Instant::now();
        let entry = Entry {
            value,
            tags: tags.clone(),
            created_at: now,
            absolute_expires_at: expiration.absolute_ttl.map(|ttl| now + ttl),
            sliding_ttl: expiration.sliding_ttl,
            generation: self.generation.load(Ordering::Acquire),
            last_accessed: Mutex::new(now),
        };
        let incoming_size = entry.approx_size();

        // spec.md §4.G1: tag removal, tag install, then the map insert
        // must happen as one atomic step. Otherwise a concurrent
        // `invalidate_by_tags` can run between these steps and either miss
        // the key it should have evicted (if it runs before tag install)
        // or leave a dangling tag-index entry (if it runs between insert
        // and tag install).
        let _guard = self.write_lock.lock();

        let previous_tags = self.entries.get(&key).map(|e| e.tags.clone());
        if let Some(old_tags) = &previous_tags {
            self.remove_from_tag_index(&key, old_tags);
        }

        for tag in &tags {
            self.tag_index.entry(tag.clone()).or_default().insert(key.clone());
        }

        let previous = self.entries.insert(key, entry);

        self.counters.record_bytes_admitted(incoming_size);
        if let Some(previous) = previous {
            self.counters.record_bytes_evicted(previous.approx_size());
        }

        Ok(())
    }

    fn invalidate_by_tags(&self, tags: &HashSet<Tag>) -> usize {
        let _guard = self.write_lock.lock();

        let mut removed_keys = HashSet::new();
        for tag in tags {
            if let Some((_, keys)) = self.tag_index.remove(tag) {
                removed_keys.extend(keys);
            }
        }

        for key in &removed_keys {
            if let Some((_, entry)) = self.entries.remove(key) {
                self.counters.record_bytes_evicted(entry.approx_size());
                // The removed key may still carry other tags; clean those
                // reverse-index entries up too.
                self.remove_from_tag_index(key, &entry.tags);
            }
        }

        for tag in tags {
            self.counters.record_invalidation(&tag.to_string());
        }

        removed_keys.len()
    }

    fn invalidate_key(&self, key: &Fingerprint) {
        let _guard = self.write_lock.lock();
        if let Some((_, entry)) = self.entries.remove(key) {
            self.counters.record_bytes_evicted(entry.approx_size());
            self.remove_from_tag_index(key, &entry.tags);
        }
    }

    fn invalidate_all(&self) {
        let _guard = self.write_lock.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
        self.tag_index.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnSchema;
    use crate::model::ScalarType;
    use chrono::Utc;

    fn rs() -> Arc<ResultSet> {
        Arc::new(ResultSet::new(
            vec![ColumnSchema {
                name: "id".into(),
                ordinal: 0,
                driver_type_name: "INT".into(),
                value_type: ScalarType::Int32,
                nullable: false,
            }],
            vec![vec![Some(crate::model::ScalarValue::Int32(1))]],
            1,
            Utc::now(),
        ))
    }

    fn tags(names: &[&str]) -> HashSet<Tag> {
        names.iter().map(|n| Tag::new(*n)).collect()
    }

    #[test]
    fn set_then_get_roundtrips() {
        let store = LocalStore::new(Arc::new(Counters::default()));
        let key = Fingerprint::from_raw("k1");
        store
            .set(key.clone(), tags(&["products"]), rs(), ExpirationPolicy::default())
            .unwrap();
        assert!(store.get(&key).unwrap().is_some());
    }

    #[test]
    fn absolute_ttl_expires_entry() {
        let store = LocalStore::new(Arc::new(Counters::default()));
        let key = Fingerprint::from_raw("k1");
        store
            .set(
                key.clone(),
                tags(&["products"]),
                rs(),
                ExpirationPolicy::absolute(Duration::from_millis(1)),
            )
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn invalidate_by_tags_removes_matching_entries_only() {
        let store = LocalStore::new(Arc::new(Counters::default()));
        let k1 = Fingerprint::from_raw("k1");
        let k2 = Fingerprint::from_raw("k2");
        store
            .set(k1.clone(), tags(&["products"]), rs(), ExpirationPolicy::default())
            .unwrap();
        store
            .set(k2.clone(), tags(&["orders"]), rs(), ExpirationPolicy::default())
            .unwrap();

        let removed = store.invalidate_by_tags(&tags(&["products"]));
        assert_eq!(removed, 1);
        assert!(store.get(&k1).unwrap().is_none());
        assert!(store.get(&k2).unwrap().is_some());
    }

    #[test]
    fn invalidate_all_bumps_generation_and_clears() {
        let store = LocalStore::new(Arc::new(Counters::default()));
        let key = Fingerprint::from_raw("k1");
        store
            .set(key.clone(), tags(&["products"]), rs(), ExpirationPolicy::default())
            .unwrap();
        store.invalidate_all();
        assert!(store.get(&key).unwrap().is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn overwriting_a_key_cleans_up_its_old_tags() {
        let store = LocalStore::new(Arc::new(Counters::default()));
        let key = Fingerprint::from_raw("k1");
        store
            .set(key.clone(), tags(&["products"]), rs(), ExpirationPolicy::default())
            .unwrap();
        store
            .set(key.clone(), tags(&["orders"]), rs(), ExpirationPolicy::default())
            .unwrap();

        let removed = store.invalidate_by_tags(&tags(&["products"]));
        assert_eq!(removed, 0);
        assert!(store.get(&key).unwrap().is_some());
    }

    #[test]
    fn invalidate_key_removes_single_entry() {
        let store = LocalStore::new(Arc::new(Counters::default()));
        let key = Fingerprint::from_raw("k1");
        store
            .set(key.clone(), tags(&["products"]), rs(), ExpirationPolicy::default())
            .unwrap();
        store.invalidate_key(&key);
        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn set_overwrite_and_invalidate_by_tags_interleave_safely_under_contention() {
        use std::sync::Barrier;
        use std::thread;

        let store = Arc::new(LocalStore::new(Arc::new(Counters::default())));
        let key = Fingerprint::from_raw("k1");
        store
            .set(key.clone(), tags(&["products"]), rs(), ExpirationPolicy::default())
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let writer = {
            let store = store.clone();
            let key = key.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    store
                        .set(key.clone(), tags(&["products"]), rs(), ExpirationPolicy::default())
                        .unwrap();
                }
            })
        };
        let invalidator = {
            let store = store.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    store.invalidate_by_tags(&tags(&["products"]));
                }
            })
        };
        writer.join().unwrap();
        invalidator.join().unwrap();

        // Whatever the final interleaving, the tag index and entry map
        // must agree: either the key is present and reachable via its
        // tag, or it is gone from both.
        if let Some(present) = store.get(&key).unwrap() {
            let _ = present;
            let removed = store.invalidate_by_tags(&tags(&["products"]));
            assert_eq!(removed, 1);
        }
    }
}
