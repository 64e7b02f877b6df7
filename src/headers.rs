//! Cache-control header builders.
//!
//! Pure constructors returning [`HeaderMap`]s, for route handlers that set
//! their own caching policy without going through the response cache.

use http::header::{CACHE_CONTROL, ETAG, EXPIRES, LAST_MODIFIED, PRAGMA};
use http::{HeaderMap, HeaderValue};
use std::time::SystemTime;

fn insert(headers: &mut HeaderMap, name: http::header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// `Cache-Control: public, max-age=<seconds>`.
pub fn max_age(seconds: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(
        &mut headers,
        CACHE_CONTROL,
        &format!("public, max-age={seconds}"),
    );
    headers
}

/// Headers forbidding any caching of the response.
pub fn no_cache() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(
        &mut headers,
        CACHE_CONTROL,
        "no-store, no-cache, must-revalidate",
    );
    insert(&mut headers, PRAGMA, "no-cache");
    insert(&mut headers, EXPIRES, "0");
    headers
}

/// `Cache-Control: public, max-age=<n>, stale-while-revalidate=<m>`.
pub fn stale_while_revalidate(max_age_seconds: u64, stale_seconds: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(
        &mut headers,
        CACHE_CONTROL,
        &format!("public, max-age={max_age_seconds}, stale-while-revalidate={stale_seconds}"),
    );
    headers
}

/// `ETag: "<value>"`. The value is quoted if not already.
pub fn etag(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let quoted = if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        value.to_string()
    } else {
        format!("\"{value}\"")
    };
    insert(&mut headers, ETAG, &quoted);
    headers
}

/// `Last-Modified: <http-date>`.
pub fn last_modified(when: SystemTime) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, LAST_MODIFIED, &httpdate::fmt_http_date(when));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_max_age() {
        let headers = max_age(3600);
        assert_eq!(
            headers.get(CACHE_CONTROL).unwrap(),
            "public, max-age=3600"
        );
    }

    #[test]
    fn test_no_cache() {
        let headers = no_cache();
        assert_eq!(
            headers.get(CACHE_CONTROL).unwrap(),
            "no-store, no-cache, must-revalidate"
        );
        assert_eq!(headers.get(PRAGMA).unwrap(), "no-cache");
    }

    #[test]
    fn test_stale_while_revalidate() {
        let headers = stale_while_revalidate(60, 300);
        assert_eq!(
            headers.get(CACHE_CONTROL).unwrap(),
            "public, max-age=60, stale-while-revalidate=300"
        );
    }

    #[test]
    fn test_etag_quoting() {
        assert_eq!(etag("abc").get(ETAG).unwrap(), "\"abc\"");
        assert_eq!(etag("\"abc\"").get(ETAG).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_last_modified() {
        let when = UNIX_EPOCH + Duration::from_secs(784_111_777);
        let headers = last_modified(when);
        assert_eq!(
            headers.get(LAST_MODIFIED).unwrap(),
            "Sun, 06 Nov 1994 08:49:37 GMT"
        );
    }
}
