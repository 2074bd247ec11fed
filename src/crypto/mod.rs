//! Hashing primitives for the vote ledger

use crate::{Result, integrity_error};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A raw 256-bit Blake3 digest
pub type Digest = [u8; 32];

/// Cryptographic utilities
pub struct CryptoUtils;

impl CryptoUtils {
    /// Hash arbitrary data with Blake3
    pub fn hash(data: &[u8]) -> Digest {
        blake3::hash(data).into()
    }

    /// Hash the canonical JSON form of `value`
    ///
    /// Keys are sorted at every nesting level, so the digest depends only on
    /// field names and values, never on in-memory or on-disk field order.
    pub fn hash_canonical<T: Serialize>(value: &T) -> Result<Digest> {
        let canonical = Self::canonical_json(value)?;
        Ok(Self::hash(canonical.as_bytes()))
    }

    /// Render `value` as compact JSON with lexicographically sorted keys
    pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
        let sorted = Self::sort_keys(serde_json::to_value(value)?);
        Ok(serde_json::to_string(&sorted)?)
    }

    fn sort_keys(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> = map
                    .into_iter()
                    .map(|(k, v)| (k, Self::sort_keys(v)))
                    .collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.into_iter().map(Self::sort_keys).collect()),
            other => other,
        }
    }

    /// Verify that two digests are equal in constant time
    pub fn constant_time_eq(a: &Digest, b: &Digest) -> bool {
        use subtle::ConstantTimeEq;
        a.ct_eq(b).into()
    }

    /// Convert a hex string to a digest
    pub fn hex_to_hash(hex: &str) -> Result<Digest> {
        if hex.len() != 64 {
            return Err(integrity_error!(
                "Invalid hex length for hash: expected 64, got {}",
                hex.len()
            ));
        }

        let mut hash = [0u8; 32];
        hex::decode_to_slice(hex, &mut hash)
            .map_err(|e| integrity_error!("Invalid hex string: {}", e))?;
        Ok(hash)
    }

    /// Convert a digest to a lowercase hex string
    pub fn hash_to_hex(hash: &Digest) -> String {
        hex::encode(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crypto_utils() {
        let data = b"test data";
        let hash = CryptoUtils::hash(data);

        // Same data should produce same hash
        let hash2 = CryptoUtils::hash(data);
        assert_eq!(hash, hash2);
        assert!(CryptoUtils::constant_time_eq(&hash, &hash2));

        let different_hash = CryptoUtils::hash(b"different data");
        assert!(!CryptoUtils::constant_time_eq(&hash, &different_hash));
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"y": [ {"q": 1, "p": 2} ], "x": null}});
        let b = json!({"a": {"x": null, "y": [ {"p": 2, "q": 1} ]}, "b": 1});

        let canonical = CryptoUtils::canonical_json(&a).unwrap();
        assert_eq!(canonical, r#"{"a":{"x":null,"y":[{"p":2,"q":1}]},"b":1}"#);
        assert_eq!(
            CryptoUtils::hash_canonical(&a).unwrap(),
            CryptoUtils::hash_canonical(&b).unwrap()
        );
    }

    #[test]
    fn test_array_order_matters() {
        let a = json!({"votes": [1, 2]});
        let b = json!({"votes": [2, 1]});
        assert_ne!(
            CryptoUtils::hash_canonical(&a).unwrap(),
            CryptoUtils::hash_canonical(&b).unwrap()
        );
    }

    #[test]
    fn test_hex_conversions() {
        let hash = [1u8; 32];
        let hex = CryptoUtils::hash_to_hex(&hash);
        assert_eq!(hex.len(), 64);
        assert_eq!(CryptoUtils::hex_to_hash(&hex).unwrap(), hash);

        assert!(CryptoUtils::hex_to_hash("abcd").is_err());
        assert!(CryptoUtils::hex_to_hash(&"zz".repeat(32)).is_err());
    }
}
