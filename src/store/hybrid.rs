//! Hybrid L1/L2 store: an in-process [`LocalStore`] in front of a
//! pluggable out-of-process backend, the "Ambient addition" the expanded
//! spec calls for so a deployment can back the cache with something
//! shared across processes (e.g. Redis) without the interceptor caring.
//!
//! The teacher has no direct L2 analogue; this is grounded in the same
//! `async-trait` boundary pattern the teacher uses for its storage engine
//! traits (`src/storage/`), applied here to a cache backend instead.

use super::local::LocalStore;
use super::{ExpirationPolicy, Store};
use crate::codec;
use crate::error::Result;
use crate::key::Fingerprint;
use crate::model::{ResultSet, Tag};
use crate::telemetry::Counters;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// An out-of-process cache backend. Implementations store and retrieve
/// opaque bytes only; (de)serialization happens on this side of the
/// trait via [`crate::codec`], so backends never need to know the wire
/// format.
///
/// There is deliberately no `clear()`: a backend shared across processes
/// may not support (or may not want to pay for) a global flush. Full
/// invalidation is handled by [`HybridStore`] bumping a local key-version
/// instead (see `invalidate_all_async`); per-tag invalidation is handled
/// natively by the backend via `delete_by_tags`, the way a real
/// distributed cache (e.g. a tagging layer in front of Redis) would.
#[async_trait::async_trait]
pub trait L2Backend: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, tags: &[String], ttl: Option<std::time::Duration>);
    async fn delete_many(&self, keys: &[String]);
    async fn delete_by_tags(&self, tags: &[String]);
}

/// L1 is always consulted first and synchronously. L2 is populated
/// best-effort on the async path: a `get` that misses L1 falls through
/// to L2 only via [`HybridStore::get_async`], since the synchronous
/// [`Store::get`] cannot await. Interceptors that want L2 fallback on
/// read should call `get_async` directly instead of going through the
/// `Store` trait object.
///
/// L2 keys are versioned (`v<generation>:<fingerprint>`) so
/// `invalidate_all_async` can drop the whole generation by bumping a
/// counter rather than asking the backend for a global flush (spec.md
/// §4.G2: the backend may not support one). Entries written under a
/// stale generation prefix are simply never looked up again; they expire
/// off the backend on their own TTL.
pub struct HybridStore {
    l1: LocalStore,
    l2: Arc<dyn L2Backend>,
    counters: Arc<Counters>,
    generation: AtomicU64,
}

impl HybridStore {
    pub fn new(l2: Arc<dyn L2Backend>, counters: Arc<Counters>) -> Self {
        Self {
            l1: LocalStore::new(counters.clone()),
            l2,
            counters,
            generation: AtomicU64::new(0),
        }
    }

    fn l2_key(&self, key: &Fingerprint) -> String {
        format!("v{}:{}", self.generation.load(Ordering::Acquire), key.as_str())
    }

    /// Consults L1 first; on an L1 miss, asks L2 and, if found, decodes
    /// and repopulates L1 before returning. A corrupt or unparseable L2
    /// payload is treated as a miss (fail closed), never an error.
    pub async fn get_async(&self, key: &Fingerprint) -> Option<Arc<ResultSet>> {
        if let Ok(Some(hit)) = self.l1.get(key) {
            return Some(hit);
        }

        let bytes = self.l2.get(&self.l2_key(key)).await?;
        match codec::deserialize(&bytes) {
            Some(result_set) => {
                let result_set = Arc::new(result_set);
                if let Err(err) = self.l1.set(
                    key.clone(),
                    HashSet::new(),
                    result_set.clone(),
                    ExpirationPolicy::default(),
                ) {
                    warn!(error = %err, key = key.as_str(), "failed to repopulate l1 from l2 hit");
                }
                Some(result_set)
            }
            None => {
                warn!(key = key.as_str(), "discarding corrupt l2 cache payload");
                None
            }
        }
    }

    pub async fn set_async(
        &self,
        key: Fingerprint,
        tags: HashSet<Tag>,
        value: Arc<ResultSet>,
        expiration: ExpirationPolicy,
    ) {
        let bytes = codec::serialize(&value);
        let tag_strs: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        self.l2
            .set(&self.l2_key(&key), bytes, &tag_strs, expiration.absolute_ttl)
            .await;
        if let Err(err) = self.l1.set(key, tags, value, expiration) {
            warn!(error = %err, "l1 store set failed after l2 write succeeded");
        }
    }

    /// Removes matching keys from L1 and asks L2 to drop everything under
    /// these tags natively, so an L1 eviction (TTL expiry, capacity) can
    /// never resurrect a stale payload out of L2 that should have been
    /// invalidated.
    pub async fn invalidate_by_tags_async(&self, tags: &HashSet<Tag>) -> usize {
        let removed = self.l1.invalidate_by_tags(tags);
        let tag_strs: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        self.l2.delete_by_tags(&tag_strs).await;
        removed
    }

    pub async fn invalidate_key_async(&self, key: &Fingerprint) {
        self.l1.invalidate_key(key);
        self.l2.delete_many(&[self.l2_key(key)]).await;
    }

    /// Bumps the key-version generation instead of asking L2 for a global
    /// flush: every key written before this call becomes unreachable
    /// through `l2_key`, which is all "invalidate everything" requires.
    pub async fn invalidate_all_async(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.l1.invalidate_all();
    }
}

/// [`Store`] is still implemented so a [`HybridStore`] can be handed to
/// code that only knows the synchronous contract; it operates on L1
/// alone in that mode; L2 synchronization only happens through the
/// `_async` methods above.
impl Store for HybridStore {
    fn get(&self, key: &Fingerprint) -> Result<Option<Arc<ResultSet>>> {
        self.l1.get(key)
    }

    fn set(
        &self,
        key: Fingerprint,
        tags: HashSet<Tag>,
        value: Arc<ResultSet>,
        expiration: ExpirationPolicy,
    ) -> Result<()> {
        self.l1.set(key, tags, value, expiration)
    }

    fn invalidate_by_tags(&self, tags: &HashSet<Tag>) -> usize {
        self.l1.invalidate_by_tags(tags)
    }

    fn invalidate_key(&self, key: &Fingerprint) {
        self.l1.invalidate_key(key);
    }

    fn invalidate_all(&self) {
        self.l1.invalidate_all();
    }

    fn len(&self) -> usize {
        self.l1.len()
    }
}
