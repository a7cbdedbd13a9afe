//! Stash: a transparent second-level query-result cache for an ORM's
//! command-execution pipeline. See [`interceptor::Interceptor`] for the
//! read-side state machine and [`save::SaveInterceptor`] for the
//! write-side invalidation protocol.

pub mod capture;
pub mod codec;
pub mod config;
pub mod directive;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod interceptor;
pub mod invalidation;
pub mod key;
pub mod model;
pub mod orm;
pub mod reader;
pub mod save;
pub mod store;
pub mod telemetry;

pub use config::{Profile, StashConfig, StashConfigBuilder};
pub use error::{Result, StashError};
pub use interceptor::{BeginDecision, ExecutionContext, Interceptor};
pub use invalidation::InvalidationApi;
pub use key::{Fingerprint, KeyGenerator};
pub use model::{ResultSet, ScalarType, ScalarValue, Tag};
pub use save::SaveInterceptor;
pub use store::{hybrid::HybridStore, local::LocalStore, ExpirationPolicy, Store};
pub use telemetry::{CacheEvent, Counters, HealthProbe, HealthStatus};
