//! Command interceptor (component H): the central state machine sitting
//! between the ORM and the driver, grounded in the teacher's
//! `cache::query_cache::QueryCache` request path but built around the two
//! ORM execution callbacks (`Executing`/`Executed`) spec.md §4.H names.
//!
//! Per spec.md §9's design note on the "weak command-to-key carry": this
//! implementation threads an explicit [`ExecutionContext`] from
//! [`Interceptor::begin`] to [`Interceptor::complete`] instead of a
//! weak-keyed map, since Rust has no GC-backed weak references to lean
//! on — the caller owns the context across the async boundary and passes
//! it back, which satisfies the same observable contract (key carries
//! from `Executing` to `Executed`, read-once, on the same command).

use crate::capture::{self, Capture};
use crate::config::StashConfig;
use crate::directive::{self, Directive};
use crate::driver::{AsyncRowReader, Command, RowReader};
use crate::error::StashError;
use crate::extractor;
use crate::key::{Fingerprint, KeyGenerator};
use crate::model::Tag;
use crate::reader::CachedRowReader;
use crate::store::{ExpirationPolicy, Store};
use crate::telemetry::{CacheEvent, Counters, EventKind};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Carries the fingerprint and resolved TTLs computed at `Executing` time
/// forward to `Executed` time, read once by [`Interceptor::complete`].
pub struct ExecutionContext {
    key: Fingerprint,
    tags: HashSet<Tag>,
    expiration: ExpirationPolicy,
}

/// Outcome of [`Interceptor::begin`].
pub enum BeginDecision {
    /// The command is not eligible for caching; execute it against the
    /// driver as normal.
    Bypass,
    /// A cached result already exists; replace the live reader with a
    /// replay over it.
    CacheHit(CachedRowReader),
    /// No cached result; execute the command, then call
    /// [`Interceptor::complete`] with the returned context.
    Miss(ExecutionContext),
}

/// `ShouldCache` predicate (spec.md §4.H, normative). Returned as an enum
/// rather than a bare `bool` so the excluded-table case — distinct from
/// an ordinary bypass — can drive its own telemetry in `begin`.
enum CacheDecision {
    Bypass,
    BypassExcludedTable(Tag),
    Eligible,
}

fn decide(sql: &str, has_upstream_result: bool, directive: &Directive, config: &StashConfig) -> CacheDecision {
    if has_upstream_result {
        return CacheDecision::Bypass;
    }
    if directive.is_opt_out {
        return CacheDecision::Bypass;
    }
    if !begins_with_select_or_with(sql) {
        return CacheDecision::Bypass;
    }
    if directive.is_opt_in {
        return CacheDecision::Eligible;
    }
    if config.cache_all_queries {
        let tables = extractor::extract_tables(sql);
        if let Some(excluded) = tables.iter().find(|t| config.is_table_excluded(t.as_str())) {
            return CacheDecision::BypassExcludedTable(excluded.clone());
        }
        return CacheDecision::Eligible;
    }
    CacheDecision::Bypass
}

/// Skip leading line (`--`) and block (`/* */`) comments and whitespace,
/// then check the first token case-insensitively.
fn begins_with_select_or_with(sql: &str) -> bool {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = match stripped.find('\n') {
                Some(idx) => stripped[idx + 1..].trim_start(),
                None => "",
            };
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = match stripped.find("*/") {
                Some(idx) => stripped[idx + 2..].trim_start(),
                None => "",
            };
        } else {
            break;
        }
    }
    let upper_prefix: String = rest.chars().take(6).collect::<String>().to_uppercase();
    upper_prefix.starts_with("SELECT") || upper_prefix.starts_with("WITH")
}

/// TTL resolution (spec.md §4.H).
fn resolve_expiration(directive: &Directive, config: &StashConfig) -> ExpirationPolicy {
    if let Some(profile_name) = &directive.profile_name {
        if let Some(profile) = config.profiles.get(profile_name) {
            return ExpirationPolicy {
                absolute_ttl: Some(profile.absolute_ttl.unwrap_or(config.default_absolute_expiration)),
                sliding_ttl: profile.sliding_ttl.or(config.default_sliding_expiration),
            };
        }
    }

    ExpirationPolicy {
        absolute_ttl: Some(directive.absolute_ttl.unwrap_or(config.default_absolute_expiration)),
        sliding_ttl: directive.sliding_ttl.or(config.default_sliding_expiration),
    }
}

/// The command interceptor. Holds no per-command state itself; all
/// per-command state lives in the [`ExecutionContext`] the caller threads
/// through.
pub struct Interceptor {
    config: Arc<StashConfig>,
    store: Arc<dyn Store>,
    key_generator: KeyGenerator,
    counters: Arc<Counters>,
}

impl Interceptor {
    pub fn new(config: Arc<StashConfig>, store: Arc<dyn Store>, counters: Arc<Counters>) -> Self {
        let key_generator = KeyGenerator::new(config.key_prefix.clone());
        Self {
            config,
            store,
            key_generator,
            counters,
        }
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(sink) = &self.config.on_event {
            sink(event);
        }
    }

    /// `Executing` stage: decide whether this command is cacheable, and if
    /// so, whether it is already cached.
    pub fn begin(&self, command: &Command, has_upstream_result: bool) -> BeginDecision {
        let directive = directive::parse(&command.text);

        match decide(&command.text, has_upstream_result, &directive, &self.config) {
            CacheDecision::Bypass => return BeginDecision::Bypass,
            CacheDecision::BypassExcludedTable(table) => {
                let err = StashError::ExcludedTable(table.to_string());
                debug!(%err, "skipping cache admission");
                self.counters.record_skip();
                self.emit(
                    CacheEvent::new(EventKind::SkippedExcludedTable).with_tables(vec![table.to_string()]),
                );
                return BeginDecision::Bypass;
            }
            CacheDecision::Eligible => {}
        }

        let key = self.key_generator.fingerprint(command);

        match self.store.get(&key) {
            Ok(Some(result)) => {
                self.counters.record_hit();
                self.emit(
                    CacheEvent::new(EventKind::CacheHit)
                        .with_key(key.as_str())
                        .with_row_count(result.row_count()),
                );
                return BeginDecision::CacheHit(CachedRowReader::new(result));
            }
            Ok(None) => {}
            Err(err) => self.record_store_error(err),
        }

        self.counters.record_miss();
        self.emit(CacheEvent::new(EventKind::CacheMiss).with_key(key.as_str()));

        let tags = extractor::extract_tables(&command.text);
        let expiration = resolve_expiration(&directive, &self.config);

        BeginDecision::Miss(ExecutionContext {
            key,
            tags,
            expiration,
        })
    }

    /// Shared by the sync/async `complete` entry points: decides whether
    /// a completed capture is admitted, stores it if so, and always
    /// returns a reader to hand back to the ORM.
    fn finish_capture(&self, ctx: ExecutionContext, capture: Capture) -> CachedRowReader {
        match capture {
            Capture::Complete(result) => {
                let result = Arc::new(result);
                // The row-count limit was already enforced during capture
                // (a breach yields `Capture::TooLarge`, handled below);
                // only the byte-size admission check remains here.
                if self.config.max_cache_entry_size > 0
                    && result.approx_byte_size > self.config.max_cache_entry_size
                {
                    let err = StashError::TooLarge {
                        size: result.approx_byte_size,
                        limit: self.config.max_cache_entry_size,
                    };
                    debug!(%err, "skipping cache admission");
                    self.counters.record_skip();
                    self.emit(
                        CacheEvent::new(EventKind::SkippedTooLarge)
                            .with_key(ctx.key.as_str())
                            .with_size_bytes(result.approx_byte_size),
                    );
                    return CachedRowReader::new(result);
                }

                if let Err(err) = self.store.set(ctx.key.clone(), ctx.tags, result.clone(), ctx.expiration) {
                    self.record_store_error(err);
                    return CachedRowReader::new(result);
                }
                self.emit(
                    CacheEvent::new(EventKind::QueryResultCached)
                        .with_key(ctx.key.as_str())
                        .with_row_count(result.row_count())
                        .with_size_bytes(result.approx_byte_size),
                );
                CachedRowReader::new(result)
            }
            Capture::TooLarge(marker) => {
                let err = StashError::TooManyRows {
                    captured: marker.rows_drained.len(),
                    limit: self.config.max_rows_per_query,
                };
                debug!(%err, "row limit exceeded during capture");
                self.counters.record_skip();
                self.emit(
                    CacheEvent::new(EventKind::SkippedTooManyRows)
                        .with_key(ctx.key.as_str())
                        .with_row_count(marker.rows_drained.len()),
                );
                // spec.md §9 open question, resolved in DESIGN.md: preserve
                // the source's behavior of an empty replay reader rather
                // than replaying the rows drained before the row limit hit.
                let empty = crate::model::ResultSet::new(
                    marker.schema,
                    Vec::new(),
                    marker.records_affected,
                    chrono_now(),
                );
                CachedRowReader::new(Arc::new(empty))
            }
        }
    }

    /// `Executed` stage (sync driver): drain `reader` and admit/replay.
    /// Only called when [`Interceptor::begin`] returned `Miss`.
    pub fn complete(&self, ctx: ExecutionContext, reader: &mut dyn RowReader) -> CachedRowReader {
        let capture = capture::capture_sync(reader, self.config.max_rows_per_query);
        self.finish_capture(ctx, capture)
    }

    /// `Executed` stage (async driver).
    pub async fn complete_async(
        &self,
        ctx: ExecutionContext,
        reader: &mut dyn AsyncRowReader,
    ) -> CachedRowReader {
        let capture = capture::capture_async(reader, self.config.max_rows_per_query).await;
        self.finish_capture(ctx, capture)
    }

    /// Exposed for callers that need to report a store failure during
    /// `Set` (e.g. a hybrid store's L2 write failing) without going
    /// through `finish_capture` — falls back to letting the live result
    /// propagate per spec.md §4.H's admission rule.
    pub fn record_store_error(&self, err: impl std::fmt::Display) {
        self.counters.record_error();
        warn!(error = %err, "cache store error, falling back to database result");
        self.emit(CacheEvent::new(EventKind::CacheError).with_error(err.to_string()));
        if self.config.fallback_to_database {
            self.emit(CacheEvent::new(EventKind::CacheFallbackToDb));
        }
    }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
