use serde_json::Value;
use sha2::{Digest, Sha256};

/// Deterministic fingerprint of a configuration payload.
///
/// SHA-256 over a canonical rendering: object keys sorted, no insignificant
/// whitespace. The hash is stable regardless of the key order the payload
/// arrived with, so constrained devices can compare hashes instead of
/// re-parsing a full configuration on every poll.
pub fn content_hash(payload: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(payload, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key is a plain string; serde_json handles escaping
                out.push_str(&serde_json::to_string(key).expect("string serialization"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars serialize deterministically
        leaf => out.push_str(&serde_json::to_string(leaf).expect("scalar serialization")),
    }
}
