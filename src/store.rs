//! Namespaced key-value cache store.
//!
//! `CacheStore` is the one layer that talks to the backend. It owns key
//! generation, serialization, compression, TTLs and tag registration, and it
//! is strictly fail-open: every backend error is logged and converted into a
//! benign default (`None`, `false`, `0`, empty). Callers never see a cache
//! failure as anything other than a miss.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::Backend;
use crate::compress;
use crate::error::CacheError;
use crate::key;
use crate::metrics::{CacheMetric, MetricsSink};

/// Configuration for [`CacheStore`].
#[derive(Debug, Clone)]
pub struct CacheStoreConfig {
    /// Prefix embedded in every backend key.
    pub prefix: String,
    /// TTL in seconds applied when an operation does not specify one.
    pub default_ttl: u64,
    /// Serialized payloads above this many bytes are compressed when the
    /// operation opts in.
    pub compression_threshold: usize,
    /// Upper bound on data TTLs; tag sets live twice this long so they
    /// outlive every entry they index.
    pub max_data_ttl: u64,
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        CacheStoreConfig {
            prefix: "fieldcache".to_string(),
            default_ttl: 3600,
            compression_threshold: compress::COMPRESSION_THRESHOLD,
            max_data_ttl: 86_400,
        }
    }
}

/// Per-call options for write operations.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Expiry in seconds; falls back to the store default.
    pub ttl: Option<u64>,
    /// Compress serialized payloads above the store threshold.
    pub compress: bool,
    /// Tags whose member sets this entry joins.
    pub tags: Vec<String>,
}

impl CacheOptions {
    pub fn with_ttl(ttl: u64) -> Self {
        CacheOptions {
            ttl: Some(ttl),
            ..Default::default()
        }
    }
}

/// Snapshot of cache usage returned by [`CacheStore::stats`].
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_keys: u64,
    pub memory_bytes: u64,
    /// Live key counts per namespace under this store's prefix.
    pub namespaces: HashMap<String, u64>,
}

/// Namespaced cache store over a shared remote backend.
///
/// Cheap to clone; clones share the backend connection and metrics sink.
/// Construct once at startup and inject into every component that caches.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn Backend>,
    config: CacheStoreConfig,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn Backend>, config: CacheStoreConfig) -> Self {
        CacheStore {
            backend,
            config,
            metrics: None,
        }
    }

    /// Attach a metrics sink; every get/set/del emits one metric to it.
    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn config(&self) -> &CacheStoreConfig {
        &self.config
    }

    /// The full backend key for a namespaced entry. Exposed so callers that
    /// need raw backend access (tests, diagnostics) derive identical keys.
    pub fn full_key(&self, namespace: &str, key: &str, owner: Option<&str>) -> String {
        key::build_key(&self.config.prefix, namespace, owner, key)
    }

    fn emit(&self, metric: CacheMetric) {
        if let Some(sink) = &self.metrics {
            sink.emit(metric);
        }
    }

    fn encode_payload<T: Serialize>(
        &self,
        value: &T,
        options: &CacheOptions,
    ) -> Result<String, CacheError> {
        // Strings are stored raw, everything else as JSON text.
        let serialized = match serde_json::to_value(value)
            .map_err(|e| CacheError::Serialization(e.to_string()))?
        {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        if options.compress && serialized.len() > self.config.compression_threshold {
            compress::compress(&serialized)
        } else {
            Ok(serialized)
        }
    }

    fn decode_payload<T: DeserializeOwned>(&self, raw: String) -> Result<T, CacheError> {
        let payload = if compress::is_compressed(&raw) {
            compress::decompress(&raw)?
        } else {
            raw
        };
        // JSON first, falling back to treating the payload as a bare string.
        match serde_json::from_str(&payload) {
            Ok(value) => Ok(value),
            Err(_) => serde_json::from_value(serde_json::Value::String(payload))
                .map_err(|e| CacheError::Serialization(e.to_string())),
        }
    }

    async fn register_tags(&self, tags: &[String], member_keys: &[String]) {
        let tag_ttl = self.config.max_data_ttl * 2;
        for tag in tags {
            let tag_key = key::tag_key(&self.config.prefix, tag);
            if let Err(e) = self.backend.sadd(&tag_key, member_keys).await {
                tracing::warn!(tag = %tag, error = %e, "failed to register tag members");
                continue;
            }
            if let Err(e) = self.backend.expire(&tag_key, tag_ttl).await {
                tracing::warn!(tag = %tag, error = %e, "failed to refresh tag set ttl");
            }
        }
    }

    /// Store a value. Returns `false` on any failure.
    pub async fn set<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        options: &CacheOptions,
        owner: Option<&str>,
    ) -> bool {
        let start = Instant::now();
        let payload = match self.encode_payload(value, options) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e, "cache set skipped");
                return false;
            }
        };
        let ttl = options.ttl.unwrap_or(self.config.default_ttl);
        let full_key = self.full_key(namespace, key, owner);
        if let Err(e) = self.backend.set_ex(&full_key, &payload, ttl).await {
            tracing::warn!(namespace = %namespace, key = %key, error = %e, "cache set failed");
            return false;
        }
        if !options.tags.is_empty() {
            self.register_tags(&options.tags, std::slice::from_ref(&full_key))
                .await;
        }
        self.emit(CacheMetric::Write {
            namespace: namespace.to_string(),
            key: key.to_string(),
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
        });
        true
    }

    /// Fetch a value. Returns `None` on miss, decode failure, or backend
    /// failure.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
        owner: Option<&str>,
    ) -> Option<T> {
        let start = Instant::now();
        let full_key = self.full_key(namespace, key, owner);
        let raw = match self.backend.get(&full_key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e, "cache get failed");
                return None;
            }
        };
        self.emit(CacheMetric::Read {
            namespace: namespace.to_string(),
            key: key.to_string(),
            hit: raw.is_some(),
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
        });
        match self.decode_payload(raw?) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e, "cache entry unreadable");
                None
            }
        }
    }

    /// Delete a key and unregister it from every tag set.
    ///
    /// Returns `false` when the key did not exist; repeated deletes are safe.
    pub async fn del(&self, namespace: &str, key: &str, owner: Option<&str>) -> bool {
        let start = Instant::now();
        let full_key = self.full_key(namespace, key, owner);
        let deleted = match self.backend.del(std::slice::from_ref(&full_key)).await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e, "cache del failed");
                false
            }
        };
        // There is no reverse index from key to tags, so this walks every
        // tag set. O(number of tags) per delete.
        match self.backend.scan(&key::tag_pattern(&self.config.prefix)).await {
            Ok(tag_keys) => {
                for tag_key in tag_keys {
                    if let Err(e) = self
                        .backend
                        .srem(&tag_key, std::slice::from_ref(&full_key))
                        .await
                    {
                        tracing::warn!(tag_key = %tag_key, error = %e, "tag cleanup failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "tag scan failed during delete");
            }
        }
        self.emit(CacheMetric::Remove {
            namespace: namespace.to_string(),
            key: key.to_string(),
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
        });
        deleted
    }

    /// Whether a key currently exists.
    pub async fn exists(&self, namespace: &str, key: &str, owner: Option<&str>) -> bool {
        let full_key = self.full_key(namespace, key, owner);
        match self.backend.exists(&full_key).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e, "cache exists failed");
                false
            }
        }
    }

    /// Batch get preserving input-key order. Unreadable or missing entries
    /// come back as `None`.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        namespace: &str,
        keys: &[String],
        owner: Option<&str>,
    ) -> Vec<Option<T>> {
        let full_keys: Vec<String> = keys
            .iter()
            .map(|k| self.full_key(namespace, k, owner))
            .collect();
        match self.backend.mget(&full_keys).await {
            Ok(values) => values
                .into_iter()
                .map(|raw| {
                    raw.and_then(|raw| match self.decode_payload(raw) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            tracing::warn!(namespace = %namespace, error = %e, "cache entry unreadable");
                            None
                        }
                    })
                })
                .collect(),
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "cache mget failed");
                keys.iter().map(|_| None).collect()
            }
        }
    }

    /// Batch set with one shared TTL. Per-item serialization and compression
    /// rules are identical to [`CacheStore::set`].
    pub async fn mset<T: Serialize>(
        &self,
        namespace: &str,
        items: &[(String, T)],
        options: &CacheOptions,
        owner: Option<&str>,
    ) -> bool {
        if items.is_empty() {
            return true;
        }
        let mut encoded = Vec::with_capacity(items.len());
        for (item_key, value) in items {
            match self.encode_payload(value, options) {
                Ok(payload) => encoded.push((self.full_key(namespace, item_key, owner), payload)),
                Err(e) => {
                    tracing::warn!(namespace = %namespace, key = %item_key, error = %e, "cache mset skipped");
                    return false;
                }
            }
        }
        let ttl = options.ttl.unwrap_or(self.config.default_ttl);
        if let Err(e) = self.backend.mset_ex(&encoded, ttl).await {
            tracing::warn!(namespace = %namespace, error = %e, "cache mset failed");
            return false;
        }
        if !options.tags.is_empty() {
            let member_keys: Vec<String> = encoded.into_iter().map(|(k, _)| k).collect();
            self.register_tags(&options.tags, &member_keys).await;
        }
        true
    }

    /// Atomic counter. Returns the new value, or 0 on failure.
    pub async fn increment(
        &self,
        namespace: &str,
        key: &str,
        delta: i64,
        owner: Option<&str>,
    ) -> i64 {
        let full_key = self.full_key(namespace, key, owner);
        match self.backend.incr_by(&full_key, delta).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e, "cache increment failed");
                0
            }
        }
    }

    /// Remaining TTL of a key in seconds, `None` if absent or without expiry.
    pub async fn ttl_remaining(
        &self,
        namespace: &str,
        key: &str,
        owner: Option<&str>,
    ) -> Option<u64> {
        let full_key = self.full_key(namespace, key, owner);
        match self.backend.ttl_remaining(&full_key).await {
            Ok(remaining) => remaining,
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e, "cache ttl lookup failed");
                None
            }
        }
    }

    /// Read-through with stale-while-revalidate.
    ///
    /// On a hit whose remaining TTL has dropped below 10% of the nominal TTL,
    /// the stale value is returned immediately and an unawaited background
    /// task refetches and re-stores it; background errors are logged and
    /// swallowed. On a miss the fetch runs synchronously and its error, if
    /// any, propagates: that is an origin failure, not a cache failure.
    ///
    /// There is no cross-process single-flight: concurrent callers may
    /// recompute the same key, so fetchers must be idempotent.
    pub async fn set_with_refresh<T, F, Fut, E>(
        &self,
        namespace: &str,
        key: &str,
        fetch: F,
        options: &CacheOptions,
        owner: Option<&str>,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        if let Some(value) = self.get::<T>(namespace, key, owner).await {
            let nominal = options.ttl.unwrap_or(self.config.default_ttl);
            let refresh_below = (nominal / 10).max(1);
            let remaining = self.ttl_remaining(namespace, key, owner).await;
            if let Some(remaining) = remaining
                && remaining < refresh_below
            {
                self.spawn_refresh(namespace, key, fetch, options, owner);
            }
            return Ok(value);
        }
        let value = fetch().await?;
        self.set(namespace, key, &value, options, owner).await;
        Ok(value)
    }

    fn spawn_refresh<T, F, Fut, E>(
        &self,
        namespace: &str,
        key: &str,
        fetch: F,
        options: &CacheOptions,
        owner: Option<&str>,
    ) where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let store = self.clone();
        let namespace = namespace.to_string();
        let key = key.to_string();
        let options = options.clone();
        let owner = owner.map(|o| o.to_string());
        tokio::spawn(async move {
            match fetch().await {
                Ok(value) => {
                    store
                        .set(&namespace, &key, &value, &options, owner.as_deref())
                        .await;
                    tracing::debug!(namespace = %namespace, key = %key, "background refresh stored");
                }
                Err(e) => {
                    tracing::warn!(namespace = %namespace, key = %key, error = %e, "background refresh failed");
                }
            }
        });
    }

    /// Delete every member of each tag, then the tag sets themselves.
    ///
    /// Returns the total number of member keys deleted. Safe to call for
    /// unknown tags.
    pub async fn invalidate_by_tags(&self, tags: &[&str]) -> usize {
        let mut total = 0;
        for tag in tags {
            let tag_key = key::tag_key(&self.config.prefix, tag);
            let members = match self.backend.smembers(&tag_key).await {
                Ok(members) => members,
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "tag member lookup failed");
                    continue;
                }
            };
            if !members.is_empty() {
                match self.backend.del(&members).await {
                    Ok(deleted) => total += deleted,
                    Err(e) => {
                        tracing::warn!(tag = %tag, error = %e, "tag member delete failed");
                        continue;
                    }
                }
            }
            if let Err(e) = self.backend.del(std::slice::from_ref(&tag_key)).await {
                tracing::warn!(tag = %tag, error = %e, "tag set delete failed");
            }
        }
        total
    }

    /// Delete every key in a namespace via pattern scan. Returns the count.
    pub async fn clear_namespace(&self, namespace: &str) -> usize {
        let pattern = key::namespace_pattern(&self.config.prefix, namespace);
        let keys = match self.backend.scan(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "namespace scan failed");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }
        match self.backend.del(&keys).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "namespace clear failed");
                0
            }
        }
    }

    /// Usage snapshot: backend totals plus per-namespace key counts.
    pub async fn stats(&self) -> CacheStats {
        let backend_stats = match self.backend.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "backend stats failed");
                Default::default()
            }
        };
        let mut namespaces = HashMap::new();
        match self.backend.scan(&format!("{}:*", self.config.prefix)).await {
            Ok(keys) => {
                for full_key in keys {
                    if let Some(namespace) = key::namespace_of(&self.config.prefix, &full_key) {
                        *namespaces.entry(namespace.to_string()).or_insert(0) += 1;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "namespace scan failed during stats");
            }
        }
        CacheStats {
            total_keys: backend_stats.total_keys,
            memory_bytes: backend_stats.memory_bytes,
            namespaces,
        }
    }
}
