//! Weak ETags for SCIM resources
//!
//! Computed from the canonical JSON of the persisted attributes with
//! `meta` excluded; created/lastModified timestamps do not constitute
//! semantic change, so they never perturb the version.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// `W/"<hash>"` over the canonicalized resource.
pub fn weak_etag(resource: &Value) -> String {
    let canonical = canonicalize(resource);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    let digest = hasher.finalize();
    // 16 hex chars is plenty for version discrimination.
    let hex: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    format!("W/\"{}\"", hex)
}

/// Compare a received `If-Match`/`If-None-Match` value against the current
/// ETag, tolerating a missing weak prefix.
pub fn etag_matches(header_value: &str, current: &str) -> bool {
    let normalize = |v: &str| v.trim().trim_start_matches("W/").trim_matches('"').to_string();
    header_value == "*" || normalize(header_value) == normalize(current)
}

fn canonicalize(resource: &Value) -> Value {
    match resource {
        Value::Object(map) => {
            // serde_json maps iterate in sorted key order, so re-building
            // the object yields a canonical form.
            let filtered: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(k, _)| k.as_str() != "meta")
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(filtered)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn etag_is_stable_across_meta_changes() {
        let a = json!({"userName": "jdoe", "meta": {"lastModified": "2026-01-01T00:00:00Z"}});
        let b = json!({"userName": "jdoe", "meta": {"lastModified": "2026-06-30T12:00:00Z"}});
        assert_eq!(weak_etag(&a), weak_etag(&b));
    }

    #[test]
    fn etag_changes_iff_content_changes() {
        let a = json!({"userName": "jdoe", "active": true});
        let b = json!({"userName": "jdoe", "active": false});
        assert_ne!(weak_etag(&a), weak_etag(&b));
        assert_eq!(weak_etag(&a), weak_etag(&a.clone()));
    }

    #[test]
    fn header_comparison_tolerates_weak_prefix() {
        let current = "W/\"abcdef0123456789\"";
        assert!(etag_matches("W/\"abcdef0123456789\"", current));
        assert!(etag_matches("\"abcdef0123456789\"", current));
        assert!(etag_matches("*", current));
        assert!(!etag_matches("W/\"0000000000000000\"", current));
    }
}
