//! Canonical serialization for deterministic hashing.
//!
//! This module provides functions to serialize data in a canonical, deterministic format
//! suitable for hashing, signing and cross-gateway comparison.
//!
//! ## Determinism Guarantees
//!
//! - Stable key order: every JSON object is emitted with keys sorted lexicographically,
//!   independent of struct declaration order or source-document order
//! - Compact form: no insignificant whitespace
//! - Stable Vec order: arrays serialize in index order
//!
//! The same rules apply to values that arrive as raw JSON (ontology documents), so a
//! hash computed by one gateway can be recomputed by any other.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a value to canonical JSON (sorted keys, compact).
///
/// Going through [`serde_json::Value`] normalizes key order, because the
/// default `serde_json::Map` is ordered. Fails only for maps with non-string
/// keys.
pub fn try_stable_stringify<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_value(value).map(|v| v.to_string())
}

/// [`try_stable_stringify`] for display and receipt payloads.
///
/// A value that cannot be represented as JSON yields an empty string and a
/// `warn` event. Hashes of signed content go through [`try_stable_stringify`]
/// or [`canonical_hash_without`] instead.
pub fn stable_stringify<T: Serialize + ?Sized>(value: &T) -> String {
    match try_stable_stringify(value) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(
                value_type = std::any::type_name::<T>(),
                error = %e,
                "value has no canonical JSON form"
            );
            String::new()
        }
    }
}

/// Serialize a value to canonical JSON bytes for hashing.
pub fn to_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    stable_stringify(value).into_bytes()
}

/// Compute the SHA-256 digest of a value's canonical bytes.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> [u8; 32] {
    let bytes = to_canonical_bytes(value);
    Sha256::digest(&bytes).into()
}

/// Compute canonical hash and return as lowercase hex string.
pub fn canonical_hash_hex<T: Serialize + ?Sized>(value: &T) -> String {
    hex::encode(canonical_hash(value))
}

/// Canonical hash of a JSON object with some top-level fields removed.
///
/// Used for self-describing documents that embed their own hash and signature.
pub fn canonical_hash_without(value: &Value, excluded: &[&str]) -> String {
    let canonical = match value {
        Value::Object(map) => {
            let mut stripped = map.clone();
            for key in excluded {
                stripped.remove(*key);
            }
            Value::Object(stripped).to_string()
        }
        other => other.to_string(),
    };
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct TestStruct {
        name: String,
        value: i32,
    }

    #[test]
    fn test_determinism() {
        let s = TestStruct {
            name: "test".to_string(),
            value: 42,
        };

        let h1 = canonical_hash_hex(&s);
        let h2 = canonical_hash_hex(&s);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_key_order_independent() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"d":2,"c":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"c":3,"d":2},"b":1}"#).unwrap();
        assert_eq!(stable_stringify(&a), stable_stringify(&b));
        assert_eq!(stable_stringify(&a), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn test_non_string_keys_have_no_canonical_form() {
        let mut map = std::collections::BTreeMap::new();
        map.insert((1u8, 2u8), "pair");
        assert!(try_stable_stringify(&map).is_err());
        assert_eq!(stable_stringify(&map), "");
        assert_eq!(try_stable_stringify(&json!({"b": 1, "a": 2})).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_hash_without_ignores_excluded_fields() {
        let doc = json!({"id": "x", "hash": "aaa", "signature": "bbb"});
        let other = json!({"id": "x", "hash": "zzz"});
        assert_eq!(
            canonical_hash_without(&doc, &["hash", "signature"]),
            canonical_hash_without(&other, &["hash", "signature"]),
        );
        assert_ne!(
            canonical_hash_without(&doc, &["hash", "signature"]),
            canonical_hash_without(&json!({"id": "y"}), &["hash", "signature"]),
        );
    }
}
