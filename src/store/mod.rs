//! Cache store (component G): the tag-indexed key/value layer the
//! interceptor reads from and writes to. Two implementations are
//! provided: [`local::LocalStore`] (in-process only) and
//! [`hybrid::HybridStore`] (in-process L1 in front of a pluggable L2).
//!
//! Grounded in the teacher's `cache::query_cache::QueryCache` (entry
//! shape, TTL/expiry bookkeeping) and `cache::cache_invalidation::
//! CacheInvalidator` (table-to-keys reverse index), generalized from a
//! single `RwLock<HashMap<..>>` to `dashmap` sharded maps since the
//! store must be hit from concurrent readers on every query.

pub mod hybrid;
pub mod local;

use crate::error::Result;
use crate::key::Fingerprint;
use crate::model::{ResultSet, Tag};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Absolute and/or sliding expiration for one entry. At least one of the
/// two should normally be set; an entry with neither never expires on
/// its own and can only be removed by tag/key/full invalidation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpirationPolicy {
    pub absolute_ttl: Option<Duration>,
    pub sliding_ttl: Option<Duration>,
}

impl ExpirationPolicy {
    pub fn absolute(ttl: Duration) -> Self {
        Self {
            absolute_ttl: Some(ttl),
            sliding_ttl: None,
        }
    }

    pub fn with_sliding(mut self, ttl: Duration) -> Self {
        self.sliding_ttl = Some(ttl);
        self
    }
}

/// The cache store's public contract. `get`/`set` are synchronous so the
/// interceptor's hot path never awaits on an in-process cache; the
/// hybrid implementation's L2 fan-out happens off the synchronous path
/// (see [`hybrid::HybridStore`] docs).
///
/// Both are fallible: a backend is free to report a genuine failure
/// (e.g. a future network-backed implementation losing its connection)
/// rather than panic or silently behave as a miss. `LocalStore` never
/// produces an `Err` itself — it has no I/O of its own — but callers go
/// through `Interceptor::record_store_error` either way so a failing
/// backend degrades to "serve the live database result" instead of
/// propagating the error to the ORM.
pub trait Store: Send + Sync {
    fn get(&self, key: &Fingerprint) -> Result<Option<Arc<ResultSet>>>;

    fn set(
        &self,
        key: Fingerprint,
        tags: HashSet<Tag>,
        value: Arc<ResultSet>,
        expiration: ExpirationPolicy,
    ) -> Result<()>;

    /// Returns the number of keys removed.
    fn invalidate_by_tags(&self, tags: &HashSet<Tag>) -> usize;

    fn invalidate_key(&self, key: &Fingerprint);

    fn invalidate_all(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
