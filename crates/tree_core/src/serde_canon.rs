//! Canonical JSON serialization for deterministic hashing
//!
//! Object keys are sorted recursively so that two structurally equal values
//! always produce the same bytes, and therefore the same BLAKE3 digest.
//! Used for model hashes, dataset fingerprints and tuning cache keys.

use serde::Serialize;
use serde_json::{map::Map, ser::PrettyFormatter, Serializer, Value};

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    serde_json::to_string(&canonical)
}

/// Serialize a value to canonical JSON with two-space indentation.
///
/// Same key order as [`to_canonical_json`], intended for artifacts written to disk.
pub fn to_canonical_json_pretty<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    canonical.serialize(&mut serializer)?;
    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Compute the BLAKE3 hash of the canonical JSON representation as hex
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = to_canonical_json(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::with_capacity(entries.len());
            for (key, val) in entries {
                sorted.insert(key, canonicalize(val));
            }
            Value::Object(sorted)
        }
        Value::Array(elements) => Value::Array(elements.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        b_field: i64,
        a_field: f64,
        z_field: String,
    }

    #[test]
    fn test_keys_sorted_without_whitespace() {
        let json = to_canonical_json(&Sample {
            b_field: 2,
            a_field: 0.5,
            z_field: "x".to_string(),
        })
        .unwrap();

        assert_eq!(json, r#"{"a_field":0.5,"b_field":2,"z_field":"x"}"#);
    }

    #[test]
    fn test_pretty_keeps_key_order() {
        let json = to_canonical_json_pretty(&Sample {
            b_field: 2,
            a_field: 0.5,
            z_field: "x".to_string(),
        })
        .unwrap();

        assert!(json.contains('\n'));
        assert!(json.find("a_field").unwrap() < json.find("z_field").unwrap());
    }

    #[test]
    fn test_hash_changes_with_data() {
        let h1 = hash_canonical_hex(&Sample {
            b_field: 2,
            a_field: 0.5,
            z_field: "x".to_string(),
        })
        .unwrap();
        let h2 = hash_canonical_hex(&Sample {
            b_field: 3,
            a_field: 0.5,
            z_field: "x".to_string(),
        })
        .unwrap();

        assert_eq!(h1.len(), 64);
        assert_ne!(h1, h2);
    }
}
