//! HTTP response caching.
//!
//! `ApiResponseCache` wraps a request handler and caches whole responses in
//! the `api` namespace: key derivation from method/path/query (plus optional
//! `Vary` headers), ETag-based conditional responses, background
//! revalidation, and gzip for large bodies. It is an explicit higher-order
//! wrapper over `http` types, so it composes with any hyper/axum/tower
//! server without depending on one.
//!
//! Handler errors always propagate unchanged; only genuine cache traffic is
//! affected by cache failures.

use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::compress;
use crate::headers;
use crate::key;
use crate::store::{CacheOptions, CacheStore};
use crate::strategy::strategy_for;
use crate::util::now_ms;

/// Namespace holding all cached HTTP responses.
pub const API_NAMESPACE: &str = "api";

/// Response header reporting cache disposition.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Response headers preserved in cached records.
const RESPONSE_HEADER_WHITELIST: &[&str] = &[
    "content-type",
    "content-encoding",
    "content-language",
    "vary",
    "last-modified",
];

/// Predicate deciding whether a request bypasses the cache entirely.
pub type SkipPredicate = Arc<dyn Fn(&Request<Bytes>) -> bool + Send + Sync>;

/// Configuration for [`ApiResponseCache`].
#[derive(Clone)]
pub struct ResponseCacheConfig {
    /// Entry TTL in seconds.
    pub ttl: u64,
    /// Age in seconds after which a hit triggers an unawaited background
    /// refetch. `None` disables revalidation.
    pub revalidate_after: Option<u64>,
    /// Request headers whose values become part of the cache key.
    pub vary_by: Vec<String>,
    /// Request header carrying the opaque owner id; entries are scoped per
    /// owner when set. Identity resolution happens upstream.
    pub owner_header: Option<String>,
    /// Methods eligible for caching. Non-listed methods always bypass.
    pub cache_methods: Vec<Method>,
    /// Compress large cacheable bodies.
    pub compress: bool,
    /// Extra bypass predicate, e.g. for authenticated or preview routes.
    pub skip: Option<SkipPredicate>,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        let catalog = strategy_for(API_NAMESPACE);
        ResponseCacheConfig {
            ttl: catalog.ttl_seconds,
            revalidate_after: None,
            vary_by: Vec::new(),
            owner_header: None,
            cache_methods: vec![Method::GET],
            compress: catalog.compress,
            skip: None,
        }
    }
}

/// A cached HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCacheRecord {
    pub status: u16,
    /// Whitelisted response headers as they were returned by the handler.
    pub headers: Vec<(String, String)>,
    /// Body text, marker-prefixed gzip+base64 when `compressed` is set.
    pub body: String,
    /// Strong validator: hash of the exact (uncompressed) body text.
    pub etag: String,
    pub compressed: bool,
    /// Unix ms write timestamp, drives background revalidation.
    pub stored_at: i64,
}

/// Response-caching wrapper around a request handler.
#[derive(Clone)]
pub struct ApiResponseCache {
    store: CacheStore,
    config: ResponseCacheConfig,
}

impl ApiResponseCache {
    pub fn new(store: CacheStore, config: ResponseCacheConfig) -> Self {
        ApiResponseCache { store, config }
    }

    /// Derive the cache key for a request: `METHOD:path?query`, extended
    /// with a digest of the configured `vary_by` header values.
    pub fn cache_key(&self, req: &Request<Bytes>) -> String {
        let mut cache_key = format!("{}:{}", req.method(), req.uri().path());
        if let Some(query) = req.uri().query() {
            cache_key.push('?');
            cache_key.push_str(query);
        }
        if !self.config.vary_by.is_empty() {
            let mut joined = String::new();
            for name in &self.config.vary_by {
                if let Some(value) = req.headers().get(name.as_str()).and_then(|v| v.to_str().ok())
                {
                    joined.push_str(value);
                }
                joined.push('|');
            }
            cache_key.push_str("|v:");
            cache_key.push_str(&key::short_digest(&joined));
        }
        cache_key
    }

    fn owner_of(&self, req: &Request<Bytes>) -> Option<String> {
        let header = self.config.owner_header.as_deref()?;
        req.headers()
            .get(header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn should_skip(&self, req: &Request<Bytes>) -> bool {
        if let Some(skip) = &self.config.skip
            && skip(req)
        {
            return true;
        }
        !self.config.cache_methods.contains(req.method())
    }

    /// Run a request through the cache.
    ///
    /// Skipped or missed requests execute `handler`; its errors propagate
    /// unchanged. Hits are served from the cached record, with a `304` when
    /// the client's `If-None-Match` matches the stored ETag.
    pub async fn handle<F, Fut, E>(
        &self,
        req: Request<Bytes>,
        handler: F,
    ) -> Result<Response<Bytes>, E>
    where
        F: FnOnce(Request<Bytes>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Response<Bytes>, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        if self.should_skip(&req) {
            return handler(req).await;
        }

        let cache_key = self.cache_key(&req);
        let owner = self.owner_of(&req);
        let if_none_match = req
            .headers()
            .get(IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Lookup + body decode; an unreadable record degrades to a miss.
        let mut cached: Option<(HttpCacheRecord, String)> = None;
        if let Some(record) = self
            .store
            .get::<HttpCacheRecord>(API_NAMESPACE, &cache_key, owner.as_deref())
            .await
        {
            if record.compressed {
                match compress::decompress(&record.body) {
                    Ok(body) => cached = Some((record, body)),
                    Err(e) => {
                        tracing::warn!(key = %cache_key, error = %e, "cached response unreadable");
                    }
                }
            } else {
                let body = record.body.clone();
                cached = Some((record, body));
            }
        }

        if let Some((record, body)) = cached {
            if let Some(interval) = self.config.revalidate_after
                && now_ms() - record.stored_at > interval as i64 * 1000
            {
                // Serve the aging record and refetch behind the request.
                self.spawn_refetch(cache_key.clone(), owner.clone(), req, handler);
            }
            return Ok(self
                .serve_hit(&cache_key, owner.as_deref(), record, body, if_none_match)
                .await);
        }

        let mut res = handler(req).await?;
        if res.status().is_success()
            && let Some(record) = Self::build_record(&res, self.config.compress)
        {
            let options = CacheOptions::with_ttl(self.config.ttl);
            self.store
                .set(API_NAMESPACE, &cache_key, &record, &options, owner.as_deref())
                .await;
            let response_headers = res.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&record.etag) {
                response_headers.insert(ETAG, value);
            }
            response_headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
            response_headers.extend(headers::max_age(self.config.ttl));
        }
        Ok(res)
    }

    async fn serve_hit(
        &self,
        cache_key: &str,
        owner: Option<&str>,
        record: HttpCacheRecord,
        body: String,
        if_none_match: Option<String>,
    ) -> Response<Bytes> {
        if let Some(client_etag) = &if_none_match
            && client_etag == &record.etag
        {
            let mut res = Response::new(Bytes::new());
            *res.status_mut() = StatusCode::NOT_MODIFIED;
            if let Ok(value) = HeaderValue::from_str(&record.etag) {
                res.headers_mut().insert(ETAG, value);
            }
            res.headers_mut().insert(X_CACHE, HeaderValue::from_static("HIT"));
            return res;
        }

        let remaining = self
            .store
            .ttl_remaining(API_NAMESPACE, cache_key, owner)
            .await
            .unwrap_or(0);

        let mut res = Response::new(Bytes::from(body));
        *res.status_mut() = StatusCode::from_u16(record.status).unwrap_or(StatusCode::OK);
        let response_headers = res.headers_mut();
        for (name, value) in &record.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                response_headers.insert(name, value);
            }
        }
        if let Ok(value) = HeaderValue::from_str(&record.etag) {
            response_headers.insert(ETAG, value);
        }
        response_headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
        response_headers.remove(CACHE_CONTROL);
        response_headers.extend(headers::max_age(remaining));
        res
    }

    fn spawn_refetch<F, Fut, E>(
        &self,
        cache_key: String,
        owner: Option<String>,
        req: Request<Bytes>,
        handler: F,
    ) where
        F: FnOnce(Request<Bytes>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Response<Bytes>, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let store = self.store.clone();
        let compress_enabled = self.config.compress;
        let ttl = self.config.ttl;
        tokio::spawn(async move {
            match handler(req).await {
                Ok(res) if res.status().is_success() => {
                    if let Some(record) = Self::build_record(&res, compress_enabled) {
                        let options = CacheOptions::with_ttl(ttl);
                        store
                            .set(API_NAMESPACE, &cache_key, &record, &options, owner.as_deref())
                            .await;
                        tracing::debug!(key = %cache_key, "background revalidation stored");
                    }
                }
                Ok(res) => {
                    tracing::debug!(key = %cache_key, status = %res.status(), "background revalidation kept stale entry");
                }
                Err(e) => {
                    tracing::warn!(key = %cache_key, error = %e, "background revalidation failed");
                }
            }
        });
    }

    /// Capture a 2xx response into a cacheable record. `None` for non-text
    /// bodies, which are never cached.
    fn build_record(res: &Response<Bytes>, compress_enabled: bool) -> Option<HttpCacheRecord> {
        let body = std::str::from_utf8(res.body()).ok()?.to_string();
        let etag = format!("\"{}\"", key::short_digest(&body));

        let mut whitelisted = Vec::new();
        for name in RESPONSE_HEADER_WHITELIST {
            if let Some(value) = res.headers().get(*name).and_then(|v| v.to_str().ok()) {
                whitelisted.push((name.to_string(), value.to_string()));
            }
        }

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let mut stored_body = body;
        let mut compressed = false;
        if compress_enabled && compress::should_compress(content_type, stored_body.len()) {
            match compress::compress(&stored_body) {
                Ok(packed) => {
                    stored_body = packed;
                    compressed = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "response compression failed, storing plain");
                }
            }
        }

        Some(HttpCacheRecord {
            status: res.status().as_u16(),
            headers: whitelisted,
            body: stored_body,
            etag,
            compressed,
            stored_at: now_ms(),
        })
    }

    /// Invalidate cached responses.
    ///
    /// A bare wildcard clears the whole `api` namespace; anything else is
    /// treated as one exact cache key. General glob matching is deliberately
    /// unsupported.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        if pattern == "*" || pattern == "api:*" {
            self.store.clear_namespace(API_NAMESPACE).await
        } else if self.store.del(API_NAMESPACE, pattern, None).await {
            1
        } else {
            0
        }
    }
}
