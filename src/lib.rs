//! fieldcache - the caching subsystem of the field reporting platform
//!
//! This library provides:
//! - A namespaced, tag-invalidated key-value cache over a Redis-compatible
//!   backend, with compression and stale-while-revalidate
//! - Domain-level get-or-compute helpers driven by a static strategy catalog
//! - An HTTP response cache with ETags, conditional responses and background
//!   revalidation
//!
//! Every cache operation fails open: a broken backend degrades performance,
//! never correctness.
//!
//! # Example
//!
//! ```ignore
//! use fieldcache::{
//!     ApiResponseCache, CacheService, CacheStore, CacheStoreConfig,
//!     RedisBackend, RedisBackendConfig, ResponseCacheConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     // One backend connection per process, injected explicitly.
//!     let backend = Arc::new(
//!         RedisBackend::new(RedisBackendConfig {
//!             url: "redis://localhost:6379".to_string(),
//!         })
//!         .await
//!         .expect("redis unreachable"),
//!     );
//!     let store = CacheStore::new(backend, CacheStoreConfig::default());
//!
//!     let service = CacheService::new(store.clone());
//!     let report: Result<serde_json::Value, _> = service
//!         .get_report("abc123", || async {
//!             // Load from the source of truth.
//!             Ok::<_, fieldcache::BoxError>(serde_json::json!({"title": "X"}))
//!         })
//!         .await;
//!
//!     let _api_cache = ApiResponseCache::new(store, ResponseCacheConfig::default());
//!     let _ = report;
//! }
//! ```

pub mod backend;
mod compress;
mod error;
pub mod headers;
mod key;
mod metrics;
mod response_cache;
mod service;
mod store;
mod strategy;
mod util;

// Re-export public API
pub use backend::memory::MemoryBackend;
pub use backend::redis::{RedisBackend, RedisBackendConfig};
pub use backend::{Backend, BackendStats};
pub use compress::{
    COMPRESSION_MARKER, COMPRESSION_THRESHOLD, apply_compression_headers, compress, decompress,
    is_compressed, should_compress,
};
pub use error::CacheError;
pub use key::{GLOBAL_OWNER, MAX_KEY_LEN, build_key, short_digest};
pub use metrics::{CacheMetric, MetricsSink};
pub use response_cache::{
    API_NAMESPACE, ApiResponseCache, HttpCacheRecord, ResponseCacheConfig, SkipPredicate, X_CACHE,
};
pub use service::{BoxError, CacheService, EntityKind, ListQuery, WarmupSource};
pub use store::{CacheOptions, CacheStats, CacheStore, CacheStoreConfig};
pub use strategy::{CacheStrategy, StrategyConfig, strategy_for};
