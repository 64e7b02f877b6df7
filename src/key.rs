//! Cache key generation.
//!
//! All keys follow the layout `prefix:namespace:owner:logical_key`, where the
//! owner segment is `"global"` for entries that are not scoped to a caller.
//! Keys that exceed the backend's practical length bound are replaced by a
//! deterministic hash, with the namespace still embedded in plain text so two
//! namespaces can never collide through the hash fallback.

use sha2::{Digest, Sha256};

/// Keys longer than this are replaced by their hashed form.
pub const MAX_KEY_LEN: usize = 250;

/// Owner segment used when no owner scope applies.
pub const GLOBAL_OWNER: &str = "global";

/// Build the full backend key for a namespaced entry.
///
/// Pure and deterministic: identical inputs always yield identical output.
pub fn build_key(prefix: &str, namespace: &str, owner: Option<&str>, key: &str) -> String {
    let owner = owner.unwrap_or(GLOBAL_OWNER);
    let full = format!("{prefix}:{namespace}:{owner}:{key}");
    if full.len() <= MAX_KEY_LEN {
        return full;
    }
    // Hash fallback: fixed length, not reversible. The namespace stays in
    // front of the digest so the logical partition survives hashing.
    format!("{prefix}:{namespace}:{}", short_digest(&full))
}

/// Build the backend key for a tag's member set.
pub fn tag_key(prefix: &str, tag: &str) -> String {
    format!("{prefix}:tags:{tag}")
}

/// Scan pattern matching every key in a namespace.
pub fn namespace_pattern(prefix: &str, namespace: &str) -> String {
    format!("{prefix}:{namespace}:*")
}

/// Scan pattern matching every tag set.
pub fn tag_pattern(prefix: &str) -> String {
    format!("{prefix}:tags:*")
}

/// First 32 hex chars of the SHA-256 of `input`.
///
/// Used for the key-length fallback, list-query digests and `Vary` hashing.
pub fn short_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..16])
}

/// Extract the namespace segment from a full backend key.
///
/// Returns `None` when the key does not carry the expected prefix.
pub fn namespace_of<'a>(prefix: &str, full_key: &'a str) -> Option<&'a str> {
    let rest = full_key.strip_prefix(prefix)?.strip_prefix(':')?;
    rest.split(':').next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key_layout() {
        let key = build_key("fc", "reports", None, "abc123");
        assert_eq!(key, "fc:reports:global:abc123");

        let scoped = build_key("fc", "reports", Some("org-9"), "abc123");
        assert_eq!(scoped, "fc:reports:org-9:abc123");
    }

    #[test]
    fn test_build_key_is_deterministic() {
        let a = build_key("fc", "users", Some("u1"), "profile");
        let b = build_key("fc", "users", Some("u1"), "profile");
        assert_eq!(a, b);
    }

    #[test]
    fn test_long_keys_are_hashed() {
        let long = "x".repeat(400);
        let key = build_key("fc", "reports", None, &long);
        assert!(key.len() <= MAX_KEY_LEN);
        assert!(key.starts_with("fc:reports:"));
        // Hashed form is stable too.
        assert_eq!(key, build_key("fc", "reports", None, &long));
        // A different logical key hashes differently.
        let other = "y".repeat(400);
        assert_ne!(key, build_key("fc", "reports", None, &other));
    }

    #[test]
    fn test_hash_fallback_keeps_namespaces_apart() {
        let long = "x".repeat(400);
        let a = build_key("fc", "reports", None, &long);
        let b = build_key("fc", "users", None, &long);
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_digest_shape() {
        let digest = short_digest("GET:/api/reports?page=1");
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, short_digest("GET:/api/reports?page=1"));
        assert_ne!(digest, short_digest("GET:/api/reports?page=2"));
    }

    #[test]
    fn test_namespace_of() {
        assert_eq!(
            namespace_of("fc", "fc:reports:global:abc"),
            Some("reports")
        );
        assert_eq!(namespace_of("fc", "other:reports:global:abc"), None);
    }
}
