//! JSON utility functions

use serde_json::{Map, Number, Value as JsonValue};

/// Largest magnitude below which every integral f64 is an exact integer
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Rebuild a JSON value with every object's keys in sorted order and
/// integral floats written as integers.
///
/// `serde_json` is built with `preserve_order`, so objects otherwise keep
/// insertion order and two equal documents can serialize differently.
/// `jsonb` compares numbers by value (`1.0` equals `1`), and so does the
/// canonical form.
pub fn canonicalize_json(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(String, JsonValue)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                sorted.insert(key, canonicalize_json(inner));
            }
            JsonValue::Object(sorted)
        }
        JsonValue::Array(items) => {
            JsonValue::Array(items.into_iter().map(canonicalize_json).collect())
        }
        JsonValue::Number(n) => JsonValue::Number(normalize_number(n)),
        other => other,
    }
}

fn normalize_number(n: Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n;
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER => Number::from(f as i64),
        _ => n,
    }
}

/// Serialize a JSON value in canonical (sorted-key, compact) form.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use metricstore_server::utils::json::canonical_json_string;
///
/// let a = canonical_json_string(&json!({"tier": "top", "property_type": "sfr"}));
/// let b = canonical_json_string(&json!({"property_type": "sfr", "tier": "top"}));
/// assert_eq!(a, b);
/// assert_eq!(a, r#"{"property_type":"sfr","tier":"top"}"#);
/// ```
pub fn canonical_json_string(value: &JsonValue) -> String {
    canonicalize_json(value.clone()).to_string()
}
