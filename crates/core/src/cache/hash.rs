//! Content-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request identity.
///
/// `vary_headers` is the already-normalized `name:value` lines of the
/// headers that participate in identity, one per line.
pub fn compute_cache_key(method: &str, url: &str, vary_headers: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(vary_headers.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", "https://example.com/app", "");
        let hash2 = compute_cache_key("GET", "https://example.com/app", "");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_cache_key("GET", "https://example.com/app", "");
        let head = compute_cache_key("HEAD", "https://example.com/app", "");
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_different_headers() {
        let hash1 = compute_cache_key("GET", "https://example.com", "accept-language:en");
        let hash2 = compute_cache_key("GET", "https://example.com", "accept-language:de");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_field_boundaries() {
        let hash1 = compute_cache_key("GET", "https://example.com/a", "");
        let hash2 = compute_cache_key("GET", "https://example.com/", "a");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", "https://example.com", "");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
