//! Structured value codec for worker output.
//!
//! Worker runtimes produce values JSON cannot represent natively
//! (undefined, dates, maps, sets, big integers, error objects). The
//! worker encodes them as tagged objects of the form
//! `{"$type": "...", "value": ...}`; this module decodes them into the
//! closest plain JSON rendering.

use serde_json::{Map, Value};

const TAG_KEY: &str = "$type";
const VALUE_KEY: &str = "value";

/// Decode a worker output payload, resolving tagged non-native values.
pub fn decode(value: Value) -> Value {
    match value {
        Value::Object(map) => decode_object(map),
        Value::Array(items) => Value::Array(items.into_iter().map(decode).collect()),
        other => other,
    }
}

fn decode_object(map: Map<String, Value>) -> Value {
    let tag = map.get(TAG_KEY).and_then(Value::as_str).map(str::to_owned);
    let Some(tag) = tag else {
        return Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, decode(v)))
                .collect(),
        );
    };

    let inner = map.get(VALUE_KEY).cloned().unwrap_or(Value::Null);
    match tag.as_str() {
        "undefined" => Value::Null,
        // Dates arrive as ISO-8601 strings and stay strings
        "date" => inner,
        "bigint" => decode_bigint(inner),
        "map" => decode_map(inner),
        "set" => decode(inner),
        "error" => decode_error(inner),
        other => {
            // Unknown tags pass through undecoded so nothing is lost
            tracing::debug!(tag = other, "unknown codec tag, passing through");
            let mut map = map;
            if let Some(v) = map.remove(VALUE_KEY) {
                map.insert(VALUE_KEY.to_string(), decode(v));
            }
            Value::Object(map)
        }
    }
}

/// Big integers decode to a number when they fit in i64, else to their
/// decimal string.
fn decode_bigint(inner: Value) -> Value {
    match inner {
        Value::String(s) => match s.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(s),
        },
        other => other,
    }
}

/// Maps arrive as an array of `[key, value]` pairs and decode to an
/// object; non-string keys are rendered through their JSON form.
fn decode_map(inner: Value) -> Value {
    let Value::Array(entries) = inner else {
        return decode(inner);
    };
    let mut map = Map::new();
    for entry in entries {
        if let Value::Array(pair) = entry {
            let mut pair = pair.into_iter();
            let (Some(key), Some(value)) = (pair.next(), pair.next()) else {
                continue;
            };
            let key = match key {
                Value::String(s) => s,
                other => other.to_string(),
            };
            map.insert(key, decode(value));
        }
    }
    Value::Object(map)
}

fn decode_error(inner: Value) -> Value {
    match inner {
        Value::Object(map) => {
            let mut out = Map::new();
            for field in ["name", "message", "stack"] {
                if let Some(v) = map.get(field) {
                    out.insert(field.to_string(), v.clone());
                }
            }
            Value::Object(out)
        }
        Value::String(message) => {
            let mut out = Map::new();
            out.insert("message".to_string(), Value::String(message));
            Value::Object(out)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(decode(json!(42)), json!(42));
        assert_eq!(decode(json!("text")), json!("text"));
        assert_eq!(decode(json!({"a": [1, 2]})), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_undefined_decodes_to_null() {
        assert_eq!(decode(json!({"$type": "undefined"})), Value::Null);
    }

    #[test]
    fn test_date_keeps_iso_string() {
        let encoded = json!({"$type": "date", "value": "2026-08-29T12:00:00Z"});
        assert_eq!(decode(encoded), json!("2026-08-29T12:00:00Z"));
    }

    #[test]
    fn test_bigint_fits_or_stays_string() {
        assert_eq!(decode(json!({"$type": "bigint", "value": "123"})), json!(123));
        let huge = "123456789012345678901234567890";
        assert_eq!(
            decode(json!({"$type": "bigint", "value": huge})),
            json!(huge)
        );
    }

    #[test]
    fn test_map_decodes_to_object() {
        let encoded = json!({"$type": "map", "value": [["a", 1], ["b", {"$type": "undefined"}]]});
        assert_eq!(decode(encoded), json!({"a": 1, "b": null}));
    }

    #[test]
    fn test_set_decodes_to_array() {
        let encoded = json!({"$type": "set", "value": [1, 2, 3]});
        assert_eq!(decode(encoded), json!([1, 2, 3]));
    }

    #[test]
    fn test_error_decodes_to_object() {
        let encoded = json!({"$type": "error", "value": {"name": "TypeError", "message": "x is not a function", "stack": "..."}});
        let decoded = decode(encoded);
        assert_eq!(decoded["name"], "TypeError");
        assert_eq!(decoded["message"], "x is not a function");
    }

    #[test]
    fn test_nested_tagged_values() {
        let encoded = json!({
            "result": {"$type": "map", "value": [["ts", {"$type": "date", "value": "2026-01-01T00:00:00Z"}]]},
            "extras": [{"$type": "undefined"}]
        });
        assert_eq!(
            decode(encoded),
            json!({"result": {"ts": "2026-01-01T00:00:00Z"}, "extras": [null]})
        );
    }
}
