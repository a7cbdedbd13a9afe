//! Telemetry (component K): thread-safe counters, an event sink, and a
//! health probe, grounded in the teacher's `CacheStatistics`/
//! `CacheMetrics` (`src/cache/cache_statistics.rs`) but adapted to the
//! event taxonomy of spec.md §7.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Every observable event kind named in spec.md §7.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    CacheHit,
    CacheMiss,
    QueryResultCached,
    CacheInvalidated,
    CacheError,
    SkippedTooManyRows,
    SkippedTooLarge,
    SkippedExcludedTable,
    CacheFallbackToDb,
}

/// Payload accompanying an emitted event: `{kind, key?, tables?, row_count?,
/// size_bytes?, ttl?, duration?, error?}`.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub kind: EventKind,
    pub key: Option<String>,
    pub tables: Option<Vec<String>>,
    pub row_count: Option<usize>,
    pub size_bytes: Option<u64>,
    pub ttl: Option<Duration>,
    pub duration: Option<Duration>,
    pub error: Option<String>,
}

impl CacheEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            key: None,
            tables: None,
            row_count: None,
            size_bytes: None,
            ttl: None,
            duration: None,
            error: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn with_row_count(mut self, n: usize) -> Self {
        self.row_count = Some(n);
        self
    }

    pub fn with_size_bytes(mut self, n: u64) -> Self {
        self.size_bytes = Some(n);
        self
    }

    pub fn with_error(mut self, err: impl Into<String>) -> Self {
        self.error = Some(err.into());
        self
    }
}

/// Monotonic counters (except on explicit `reset`). All fields are
/// independent atomics rather than one lock, matching the teacher's
/// preference for lock-free counters in hot paths.
#[derive(Default)]
pub struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    skips: AtomicU64,
    invalidations_total: AtomicU64,
    bytes_cached: AtomicU64,
    invalidations_per_table: parking_lot::RwLock<HashMap<String, u64>>,
}

impl Counters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_admitted(&self, bytes: u64) {
        self.bytes_cached.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_evicted(&self, bytes: u64) {
        // Saturating: eviction accounting never drives the counter
        // negative even under races between concurrent evictions.
        self.bytes_cached
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(bytes))
            })
            .ok();
    }

    pub fn record_invalidation(&self, table: &str) {
        self.invalidations_total.fetch_add(1, Ordering::Relaxed);
        let mut per_table = self.invalidations_per_table.write();
        *per_table.entry(table.to_lowercase()).or_insert(0) += 1;
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn skips(&self) -> u64 {
        self.skips.load(Ordering::Relaxed)
    }

    pub fn invalidations_total(&self) -> u64 {
        self.invalidations_total.load(Ordering::Relaxed)
    }

    pub fn invalidations_for_table(&self, table: &str) -> u64 {
        *self
            .invalidations_per_table
            .read()
            .get(&table.to_lowercase())
            .unwrap_or(&0)
    }

    pub fn total_bytes_cached(&self) -> u64 {
        self.bytes_cached.load(Ordering::Relaxed)
    }

    /// 0 when no requests have been seen; otherwise hits / (hits+misses).
    pub fn hit_rate_percent(&self) -> f64 {
        let hits = self.hits();
        let misses = self.misses();
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.skips.store(0, Ordering::Relaxed);
        self.invalidations_total.store(0, Ordering::Relaxed);
        self.bytes_cached.store(0, Ordering::Relaxed);
        self.invalidations_per_table.write().clear();
    }
}

/// Health status reported by [`HealthProbe::check`].
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy { note: Option<String> },
    Degraded { hit_rate_percent: f64, threshold_percent: f64 },
    Unhealthy { reason: String },
}

/// Probes the cache store with a known-absent key and classifies the
/// result against the configured hit-rate threshold (spec.md §4.K).
pub struct HealthProbe {
    counters: Arc<Counters>,
    minimum_hit_rate_percent: f64,
}

impl HealthProbe {
    pub fn new(counters: Arc<Counters>, minimum_hit_rate_percent: f64) -> Self {
        Self {
            counters,
            minimum_hit_rate_percent,
        }
    }

    /// `probe_ok` is the result of actually exercising the store with a
    /// known-absent key; any error there is `Unhealthy`.
    pub fn check(&self, probe_ok: bool, probe_error: Option<String>) -> HealthStatus {
        if !probe_ok {
            return HealthStatus::Unhealthy {
                reason: probe_error.unwrap_or_else(|| "cache store probe failed".to_string()),
            };
        }

        if self.counters.total_requests() == 0 {
            return HealthStatus::Healthy {
                note: Some("no requests observed yet".to_string()),
            };
        }

        let hit_rate = self.counters.hit_rate_percent();
        if hit_rate >= self.minimum_hit_rate_percent {
            HealthStatus::Healthy { note: None }
        } else {
            HealthStatus::Degraded {
                hit_rate_percent: hit_rate,
                threshold_percent: self.minimum_hit_rate_percent,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_zero_with_no_requests() {
        let c = Counters::default();
        assert_eq!(c.hit_rate_percent(), 0.0);
    }

    #[test]
    fn hit_rate_reflects_hits_and_misses() {
        let c = Counters::default();
        c.record_hit();
        c.record_hit();
        c.record_miss();
        assert!((c.hit_rate_percent() - 66.666).abs() < 0.01);
    }

    #[test]
    fn per_table_invalidation_counts_are_tracked() {
        let c = Counters::default();
        c.record_invalidation("Products");
        c.record_invalidation("products");
        c.record_invalidation("Orders");
        assert_eq!(c.invalidations_for_table("products"), 2);
        assert_eq!(c.invalidations_for_table("orders"), 1);
        assert_eq!(c.invalidations_total(), 3);
    }

    #[test]
    fn bytes_cached_tracks_admit_and_evict() {
        let c = Counters::default();
        c.record_bytes_admitted(100);
        c.record_bytes_admitted(50);
        c.record_bytes_evicted(30);
        assert_eq!(c.total_bytes_cached(), 120);
    }

    #[test]
    fn reset_clears_all_counters() {
        let c = Counters::default();
        c.record_hit();
        c.record_miss();
        c.record_invalidation("x");
        c.reset();
        assert_eq!(c.hits(), 0);
        assert_eq!(c.invalidations_total(), 0);
    }

    #[test]
    fn health_probe_is_healthy_with_no_requests() {
        let counters = Arc::new(Counters::default());
        let probe = HealthProbe::new(counters, 50.0);
        assert!(matches!(
            probe.check(true, None),
            HealthStatus::Healthy { note: Some(_) }
        ));
    }

    #[test]
    fn health_probe_degrades_below_threshold() {
        let counters = Arc::new(Counters::default());
        counters.record_miss();
        counters.record_miss();
        counters.record_hit();
        let probe = HealthProbe::new(counters, 90.0);
        assert!(matches!(probe.check(true, None), HealthStatus::Degraded { .. }));
    }

    #[test]
    fn health_probe_is_healthy_above_threshold() {
        let counters = Arc::new(Counters::default());
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        let probe = HealthProbe::new(counters, 50.0);
        assert!(matches!(probe.check(true, None), HealthStatus::Healthy { .. }));
    }

    #[test]
    fn health_probe_is_unhealthy_on_probe_error() {
        let counters = Arc::new(Counters::default());
        let probe = HealthProbe::new(counters, 50.0);
        assert!(matches!(
            probe.check(false, Some("connection refused".to_string())),
            HealthStatus::Unhealthy { .. }
        ));
    }
}
