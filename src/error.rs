//! Crate-wide error type and error-taxonomy mapping.
//!
//! Mirrors the teacher's `DbError`: one variant per failure domain, each
//! with a `#[error("...: {0}")]` message, plus a `Result<T>` alias used
//! throughout the crate.

use thiserror::Error;

/// All failure modes the cache core can produce.
///
/// Variants correspond to the error taxonomy in the specification's
/// error-handling design: `CacheError`, `Corrupt`, `TooManyRows`,
/// `TooLarge`, `ExcludedTable`, plus ambient `Configuration` and
/// `InvalidInput` variants for misuse at construction time.
#[derive(Error, Debug)]
pub enum StashError {
    /// Any failure reported by a cache store backend (local or hybrid L2).
    #[error("cache store error: {0}")]
    CacheError(String),

    /// Deserialization rejected a payload (unknown type, truncated input,
    /// malformed document). Callers must treat this as a cache miss.
    #[error("corrupt cache payload: {0}")]
    Corrupt(String),

    /// Captured row count exceeded `max_rows_per_query`.
    #[error("captured {captured} rows, exceeding the limit of {limit}")]
    TooManyRows { captured: usize, limit: usize },

    /// Estimated result size exceeded `max_cache_entry_size`.
    #[error("estimated size {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// A query touched a table present in `excluded_tables`.
    #[error("table '{0}' is excluded from caching")]
    ExcludedTable(String),

    /// A `StashConfig` failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller passed a malformed argument (e.g. an unknown profile name).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StashError>;
