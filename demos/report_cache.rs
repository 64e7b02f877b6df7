//! End-to-end walkthrough of the cache layer against the in-memory backend.
//!
//! Shows the three layers working together: the raw namespaced store, the
//! entity-level service with tag invalidation, and the HTTP response cache
//! with ETags and X-Cache headers. Swap `MemoryBackend` for `RedisBackend`
//! to run the same flow against a real Redis.

use bytes::Bytes;
use http::{Method, Request, Response, header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fieldcache::{
    ApiResponseCache, BoxError, CacheService, CacheStore, CacheStoreConfig, EntityKind,
    MemoryBackend, ResponseCacheConfig, X_CACHE,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Report {
    id: String,
    title: String,
    sections: Vec<String>,
}

fn load_report_from_db(id: &str) -> Report {
    println!("  -> loading report {id} from the database");
    Report {
        id: id.to_string(),
        title: "Flood assessment, northern districts".to_string(),
        sections: vec!["overview".to_string(), "needs".to_string()],
    }
}

async fn api_handler(_req: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
    println!("  -> handler executed");
    let mut res = Response::new(Bytes::from("{\"items\":[\"r-100\"]}"));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    Ok(res)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let backend = Arc::new(MemoryBackend::new());
    let store = CacheStore::new(backend, CacheStoreConfig::default());
    let service = CacheService::new(store.clone());

    // First lookup runs the fetcher, the second is served from the cache.
    println!("get_report, cold:");
    let report: Report = service
        .get_report("r-100", || async {
            Ok::<_, BoxError>(load_report_from_db("r-100"))
        })
        .await
        .unwrap();
    println!("  {report:?}");

    println!("get_report, warm:");
    let report: Report = service
        .get_report("r-100", || async {
            Ok::<_, BoxError>(load_report_from_db("r-100"))
        })
        .await
        .unwrap();
    println!("  {} (no database call above)", report.title);

    // Editing a report sweeps the entity plus every derived aggregate.
    println!("invalidate_related after an edit:");
    let swept = service
        .invalidate_related(EntityKind::Report, "r-100", Some("scope-1"))
        .await;
    println!("  swept {swept} derived entries");

    println!("get_report after invalidation:");
    let _report: Report = service
        .get_report("r-100", || async {
            Ok::<_, BoxError>(load_report_from_db("r-100"))
        })
        .await
        .unwrap();

    // The HTTP layer caches whole responses with conditional-GET support.
    let api_cache = ApiResponseCache::new(store.clone(), ResponseCacheConfig::default());
    let request = || {
        let mut req = Request::new(Bytes::new());
        *req.method_mut() = Method::GET;
        *req.uri_mut() = "/api/reports?page=1".parse().unwrap();
        req
    };

    println!("\nGET /api/reports?page=1, cold:");
    let res = api_cache.handle(request(), api_handler).await.unwrap();
    let etag = res.headers().get(header::ETAG).cloned().unwrap();
    println!(
        "  {} x-cache={:?} etag={:?}",
        res.status(),
        res.headers().get(X_CACHE).unwrap(),
        etag
    );

    println!("GET /api/reports?page=1, warm:");
    let res = api_cache.handle(request(), api_handler).await.unwrap();
    println!(
        "  {} x-cache={:?} (no handler call above)",
        res.status(),
        res.headers().get(X_CACHE).unwrap()
    );

    println!("GET /api/reports?page=1 with If-None-Match:");
    let mut req = request();
    req.headers_mut().insert(header::IF_NONE_MATCH, etag);
    let res = api_cache.handle(req, api_handler).await.unwrap();
    println!("  {} body={} bytes", res.status(), res.body().len());

    let stats = store.stats().await;
    println!("\ncache stats: {} keys across {:?}", stats.total_keys, stats.namespaces);
}
