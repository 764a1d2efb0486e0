//! Request identity keys.

use sha2::{Digest, Sha256};

/// Compute the cache key identifying a request: method plus URL.
///
/// The method is upper-cased so `get` and `GET` share a key.
pub fn compute_request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_request_key("GET", "https://casa.test/");
        let hash2 = compute_request_key("GET", "https://casa.test/");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_method_case() {
        assert_eq!(
            compute_request_key("get", "https://casa.test/"),
            compute_request_key("GET", "https://casa.test/")
        );
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_request_key("GET", "https://casa.test/api/contact");
        let post = compute_request_key("POST", "https://casa.test/api/contact");
        assert_ne!(get, post);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_request_key("GET", "https://casa.test/");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
