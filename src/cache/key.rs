//! Cache key generation using SHA-256 hashes

use sha2::{Digest, Sha256};

/// Build `{namespace}:{resource_type}:{region}:{identity_hash}`.
///
/// The identity hash covers the locator path and its parameters sorted by
/// name, so parameter order never changes the key.
pub fn cache_key(
    namespace: &str,
    resource_type: &str,
    region: &str,
    path: &str,
    params: &[(&str, &str)],
) -> String {
    format!(
        "{}:{}:{}:{}",
        namespace,
        resource_type,
        region,
        identity_hash(path, params)
    )
}

/// Segment that separates ledger marker keys from response keys
pub const MARKER_SEGMENT: &str = ":dedup:";

/// Key of the ledger's fast-path marker for a set member.
///
/// The set name is length-prefixed, so a `:` in either the set or the member
/// can never make two different pairs share a key.
pub fn marker_key(namespace: &str, set: &str, member: &str) -> String {
    format!("{}{}{}:{}:{}", namespace, MARKER_SEGMENT, set.len(), set, member)
}

fn identity_hash(path: &str, params: &[(&str, &str)]) -> String {
    let mut hasher = Sha256::new();

    hasher.update(path.as_bytes());
    hasher.update(b"|");

    let mut sorted_params: Vec<_> = params.iter().collect();
    sorted_params.sort();

    for (k, v) in sorted_params {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }

    format!("{:x}", hasher.finalize())
}

/// Hex SHA-256 of an arbitrary key, safe to use as a file name
pub fn digest(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        let key = cache_key("gg", "summoner", "euw1", "/summoner/v4/by-name/x", &[]);
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(&parts[..3], &["gg", "summoner", "euw1"]);
        assert_eq!(parts[3].len(), 64);
    }

    #[test]
    fn test_cache_key_param_order_irrelevant() {
        let key1 = cache_key("gg", "match", "na1", "/ids", &[("start", "0"), ("count", "20")]);
        let key2 = cache_key("gg", "match", "na1", "/ids", &[("count", "20"), ("start", "0")]);
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_cache_key_distinguishes_identity() {
        let base = cache_key("gg", "match", "na1", "/ids", &[("count", "20")]);
        assert_ne!(base, cache_key("gg", "match", "euw1", "/ids", &[("count", "20")]));
        assert_ne!(base, cache_key("gg", "league", "na1", "/ids", &[("count", "20")]));
        assert_ne!(base, cache_key("gg", "match", "na1", "/ids", &[("count", "10")]));
        assert_ne!(base, cache_key("gg", "match", "na1", "/other", &[("count", "20")]));
    }

    #[test]
    fn test_marker_key_scoped_by_set() {
        assert_eq!(marker_key("gg", "matches", "M1"), "gg:dedup:7:matches:M1");
        assert_ne!(marker_key("gg", "a", "M1"), marker_key("gg", "b", "M1"));
    }

    #[test]
    fn test_marker_key_colon_in_names() {
        assert_ne!(marker_key("gg", "a:b", "c"), marker_key("gg", "a", "b:c"));
        assert_ne!(marker_key("gg", "1:a", "b"), marker_key("gg", "1", "a:b"));
    }

    #[test]
    fn test_digest_is_hex() {
        let d = digest("gg:match:na1:abc");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
