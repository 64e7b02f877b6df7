//! Domain-level caching helpers.
//!
//! `CacheService` wraps [`CacheStore`] with per-entity get-or-compute helpers
//! driven by the static strategy catalog, plus the two-tier invalidation and
//! warmup flows the reporting platform uses. The source of truth lives
//! elsewhere; callers supply a fetch closure and must never rely on the cache
//! for correctness.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;

use crate::key;
use crate::store::{CacheOptions, CacheStore};
use crate::strategy::strategy_for;

/// Errors produced by origin fetchers, opaque to the cache layer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How many recent reports [`CacheService::warmup_cache`] pre-populates.
const WARMUP_RECENT_LIMIT: usize = 20;

/// Entities the service knows how to cache and invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Report,
    Assessment,
}

impl EntityKind {
    fn namespace(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Report => "reports",
            EntityKind::Assessment => "assessments",
        }
    }

    /// Tags swept when an entity of this kind changes: the entity's own tag
    /// plus every derived aggregate that cannot be targeted by a single key.
    fn related_tags(self) -> &'static [&'static str] {
        match self {
            EntityKind::User => &["users"],
            EntityKind::Report => &["reports", "lists", "analytics"],
            EntityKind::Assessment => &["assessments", "lists", "analytics"],
        }
    }
}

/// Filter and pagination parameters for list queries; folded into the cache
/// key as a digest so each distinct query caches separately.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

/// Source-of-truth loader used by cache warmup.
#[async_trait]
pub trait WarmupSource: Send + Sync {
    /// The most recently touched reports in a scope, as `(id, report)` pairs.
    async fn recent_reports(
        &self,
        scope_id: &str,
        limit: usize,
    ) -> Result<Vec<(String, Value)>, BoxError>;

    /// The scope's analytics aggregate.
    async fn analytics(&self, scope_id: &str) -> Result<Value, BoxError>;
}

/// Per-entity caching facade over [`CacheStore`].
#[derive(Clone)]
pub struct CacheService {
    store: CacheStore,
}

impl CacheService {
    pub fn new(store: CacheStore) -> Self {
        CacheService { store }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    fn options_for(namespace: &str) -> CacheOptions {
        let config = strategy_for(namespace);
        CacheOptions {
            ttl: Some(config.ttl_seconds),
            compress: config.compress,
            tags: config.tags,
        }
    }

    async fn cached<T, F, Fut, E>(&self, namespace: &str, key: &str, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let options = Self::options_for(namespace);
        self.store
            .set_with_refresh(namespace, key, fetch, &options, None)
            .await
    }

    /// Cached user profile lookup.
    pub async fn get_user<T, F, Fut, E>(&self, user_id: &str, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.cached("users", user_id, fetch).await
    }

    /// Cached single-report lookup.
    pub async fn get_report<T, F, Fut, E>(&self, report_id: &str, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.cached("reports", report_id, fetch).await
    }

    /// Cached assessment lookup.
    pub async fn get_assessment<T, F, Fut, E>(&self, assessment_id: &str, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.cached("assessments", assessment_id, fetch).await
    }

    /// Cached report list for one scope and one filter/pagination combination.
    pub async fn get_reports_list<T, F, Fut, E>(
        &self,
        scope_id: &str,
        query: &ListQuery,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let key = Self::list_key(scope_id, query);
        self.cached("reports_list", &key, fetch).await
    }

    /// Cached analytics aggregate for a scope.
    pub async fn get_analytics<T, F, Fut, E>(&self, scope_id: &str, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let key = format!("analytics:{scope_id}");
        self.cached("analytics", &key, fetch).await
    }

    /// Deterministic list-cache key: scope plus a digest of the serialized
    /// query parameters.
    pub fn list_key(scope_id: &str, query: &ListQuery) -> String {
        let serialized = serde_json::to_string(query).unwrap_or_default();
        format!("list:{scope_id}:{}", key::short_digest(&serialized))
    }

    /// Two-tier invalidation after an entity changes: point-delete the
    /// entity's own key, then tag-sweep every derived cache (lists,
    /// analytics) that cannot be addressed individually.
    ///
    /// Returns the number of derived keys swept.
    pub async fn invalidate_related(
        &self,
        entity: EntityKind,
        entity_id: &str,
        scope_id: Option<&str>,
    ) -> usize {
        self.store.del(entity.namespace(), entity_id, None).await;
        if let Some(scope_id) = scope_id {
            self.store
                .del("analytics", &format!("analytics:{scope_id}"), None)
                .await;
        }
        self.store.invalidate_by_tags(entity.related_tags()).await
    }

    /// Pre-populate a scope's working set: the most recent reports plus the
    /// analytics aggregate. Each item fails independently; nothing here is
    /// fatal. Returns the number of entries warmed.
    pub async fn warmup_cache(&self, scope_id: &str, source: &dyn WarmupSource) -> usize {
        let mut warmed = 0;

        match source.recent_reports(scope_id, WARMUP_RECENT_LIMIT).await {
            Ok(reports) => {
                let options = Self::options_for("reports");
                for (report_id, report) in reports {
                    if self
                        .store
                        .set("reports", &report_id, &report, &options, None)
                        .await
                    {
                        warmed += 1;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(scope_id = %scope_id, error = %e, "report warmup failed");
            }
        }

        match source.analytics(scope_id).await {
            Ok(analytics) => {
                let options = Self::options_for("analytics");
                let key = format!("analytics:{scope_id}");
                if self
                    .store
                    .set("analytics", &key, &analytics, &options, None)
                    .await
                {
                    warmed += 1;
                }
            }
            Err(e) => {
                tracing::warn!(scope_id = %scope_id, error = %e, "analytics warmup failed");
            }
        }

        warmed
    }

    /// Batch lookup with a single batched origin round-trip for misses.
    ///
    /// The fallback is called at most once, with every missing key; fetched
    /// values are merged into the result and written back via `mset`.
    pub async fn batch_get<T, F, Fut, E>(
        &self,
        namespace: &str,
        keys: &[String],
        fallback: Option<F>,
    ) -> HashMap<String, T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Result<HashMap<String, T>, E>>,
        E: std::fmt::Display,
    {
        let cached: Vec<Option<T>> = self.store.mget(namespace, keys, None).await;

        let mut results = HashMap::new();
        let mut missing = Vec::new();
        for (key, value) in keys.iter().zip(cached) {
            match value {
                Some(value) => {
                    results.insert(key.clone(), value);
                }
                None => missing.push(key.clone()),
            }
        }

        if missing.is_empty() {
            return results;
        }
        let Some(fallback) = fallback else {
            return results;
        };

        match fallback(missing).await {
            Ok(fetched) => {
                let items: Vec<(String, T)> = fetched
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let options = Self::options_for(namespace);
                self.store.mset(namespace, &items, &options, None).await;
                results.extend(fetched);
            }
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "batch fallback failed");
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::store::CacheStoreConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> CacheService {
        CacheService::new(CacheStore::new(
            Arc::new(MemoryBackend::new()),
            CacheStoreConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_get_report_caches_fetch() {
        let service = service();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls_clone = calls.clone();
            let report: Result<Value, BoxError> = service
                .get_report("r-1", move || {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                    async { Ok(serde_json::json!({"title": "Flood update"})) }
                })
                .await;
            assert_eq!(report.unwrap()["title"], "Flood update");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_key_distinguishes_queries() {
        let base = ListQuery {
            page: 1,
            page_size: 20,
            ..Default::default()
        };
        let filtered = ListQuery {
            status: Some("published".to_string()),
            ..base.clone()
        };
        assert_ne!(
            CacheService::list_key("scope-1", &base),
            CacheService::list_key("scope-1", &filtered)
        );
        assert_eq!(
            CacheService::list_key("scope-1", &base),
            CacheService::list_key("scope-1", &base)
        );
    }

    #[tokio::test]
    async fn test_invalidate_related_sweeps_lists() {
        let service = service();

        let report: Result<Value, BoxError> = service
            .get_report("r-2", || async { Ok(serde_json::json!({"title": "A"})) })
            .await;
        report.unwrap();

        let list: Result<Value, BoxError> = service
            .get_reports_list("scope-1", &ListQuery::default(), || async {
                Ok(serde_json::json!(["r-2"]))
            })
            .await;
        list.unwrap();

        let swept = service
            .invalidate_related(EntityKind::Report, "r-2", Some("scope-1"))
            .await;
        assert!(swept >= 1);

        // Both the entity and the derived list are gone.
        let direct: Option<Value> = service.store().get("reports", "r-2", None).await;
        assert!(direct.is_none());
        let list_key = CacheService::list_key("scope-1", &ListQuery::default());
        let list: Option<Value> = service.store().get("reports_list", &list_key, None).await;
        assert!(list.is_none());
    }

    #[tokio::test]
    async fn test_batch_get_calls_fallback_once() {
        let service = service();
        service
            .store()
            .set(
                "users",
                "u1",
                &serde_json::json!("cached"),
                &CacheOptions::default(),
                None,
            )
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let keys = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];

        let results: HashMap<String, Value> = service
            .batch_get(
                "users",
                &keys,
                Some(move |missing: Vec<String>| {
                    let calls = calls_clone.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let mut fetched = HashMap::new();
                        for key in missing {
                            fetched.insert(key.clone(), serde_json::json!(format!("db:{key}")));
                        }
                        Ok::<_, BoxError>(fetched)
                    }
                }),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 3);
        assert_eq!(results["u1"], serde_json::json!("cached"));
        assert_eq!(results["u2"], serde_json::json!("db:u2"));

        // Fallback results were written back.
        let cached: Option<Value> = service.store().get("users", "u3", None).await;
        assert_eq!(cached, Some(serde_json::json!("db:u3")));
    }

    struct FakeSource;

    #[async_trait]
    impl WarmupSource for FakeSource {
        async fn recent_reports(
            &self,
            _scope_id: &str,
            limit: usize,
        ) -> Result<Vec<(String, Value)>, BoxError> {
            Ok((0..3.min(limit))
                .map(|i| (format!("r-{i}"), serde_json::json!({"idx": i})))
                .collect())
        }

        async fn analytics(&self, _scope_id: &str) -> Result<Value, BoxError> {
            Ok(serde_json::json!({"total_reports": 3}))
        }
    }

    #[tokio::test]
    async fn test_warmup_populates_working_set() {
        let service = service();
        let warmed = service.warmup_cache("scope-7", &FakeSource).await;
        assert_eq!(warmed, 4);

        let report: Option<Value> = service.store().get("reports", "r-0", None).await;
        assert!(report.is_some());
        let analytics: Option<Value> = service
            .store()
            .get("analytics", "analytics:scope-7", None)
            .await;
        assert_eq!(analytics, Some(serde_json::json!({"total_reports": 3})));
    }
}
