//! Hashing System - SHA-256 fingerprints and seeds
//!
//! Cache keys and mock seeds must be stable across processes and runs,
//! so everything here is derived from SHA-256 over canonical input.

use sha2::{Digest, Sha256};
use serde::Serialize;
use serde_json::{to_string, Value};

use crate::request::{FileType, ProcessType};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Request fingerprint used as the cache key
/// fingerprint = sha256(file_type + process_type + sha256(file_url))
pub fn compute_fingerprint(file_type: FileType, process_type: ProcessType, file_url: &str) -> String {
    let combined = format!(
        "{}:{}:{}",
        file_type.as_str(),
        process_type.as_str(),
        sha256_hex(file_url.as_bytes())
    );
    sha256_hex(combined.as_bytes())
}

/// Seed for the mock estimator, derived from the file identity
pub fn identity_seed(file_url: &str) -> u64 {
    let digest = Sha256::digest(file_url.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fingerprint_stable_and_distinct() {
        let url = "s3://parts/bracket.step";
        let a = compute_fingerprint(FileType::Step, ProcessType::Cnc3Axis, url);
        let b = compute_fingerprint(FileType::Step, ProcessType::Cnc3Axis, url);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, compute_fingerprint(FileType::Stp, ProcessType::Cnc3Axis, url));
        assert_ne!(a, compute_fingerprint(FileType::Step, ProcessType::Fff, url));
        assert_ne!(a, compute_fingerprint(FileType::Step, ProcessType::Cnc3Axis, "s3://parts/other.step"));
    }

    #[test]
    fn test_identity_seed_stable() {
        assert_eq!(identity_seed("a.stl"), identity_seed("a.stl"));
        assert_ne!(identity_seed("a.stl"), identity_seed("b.stl"));
    }
}
