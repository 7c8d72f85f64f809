//! Backends wrap the same payload in different envelopes (`[...]`,
//! `{data: [...]}`, `{items: [...]}`, `{clusters: [...]}`). These helpers
//! pick the first shape that fits.

use serde_json::{Map, Value};

/// The value itself when it is an array, else the first candidate field
/// holding an array, else empty.
pub fn coerce_list(value: Value, candidates: &[&str]) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            for key in candidates {
                if matches!(obj.get(*key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = obj.remove(*key) {
                        return items;
                    }
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// The first candidate field holding an object, else the value itself when
/// it is an object, else empty.
pub fn coerce_object(value: Value, candidates: &[&str]) -> Map<String, Value> {
    match value {
        Value::Object(mut obj) => {
            for key in candidates {
                if matches!(obj.get(*key), Some(Value::Object(_))) {
                    if let Some(Value::Object(inner)) = obj.remove(*key) {
                        return inner;
                    }
                }
            }
            obj
        }
        _ => Map::new(),
    }
}

/// First candidate key present as a number (or numeric string).
pub(crate) fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// First candidate key present as a non-empty string.
pub(crate) fn first_text<'a>(obj: Option<&'a Map<String, Value>>, keys: &[&str]) -> Option<&'a str> {
    let obj = obj?;
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LIST_KEYS: &[&str] = &["data", "clusters", "items"];

    #[test]
    fn list_accepts_bare_and_wrapped_arrays() {
        assert_eq!(coerce_list(json!(["a", "b"]), LIST_KEYS), vec![json!("a"), json!("b")]);
        assert_eq!(coerce_list(json!({"clusters": ["c"]}), LIST_KEYS), vec![json!("c")]);
        assert_eq!(coerce_list(json!({"items": [1]}), LIST_KEYS), vec![json!(1)]);
    }

    #[test]
    fn list_prefers_earlier_candidates_and_skips_non_arrays() {
        let value = json!({"data": {"nested": true}, "clusters": ["x"], "items": ["y"]});
        assert_eq!(coerce_list(value, LIST_KEYS), vec![json!("x")]);
        assert!(coerce_list(json!({"other": []}), LIST_KEYS).is_empty());
        assert!(coerce_list(json!(null), LIST_KEYS).is_empty());
    }

    #[test]
    fn object_unwraps_candidate_or_returns_itself() {
        let wrapped = coerce_object(json!({"data": {"cpu": 1}}), &["data"]);
        assert_eq!(wrapped.get("cpu"), Some(&json!(1)));
        let bare = coerce_object(json!({"cpu": 2}), &["data"]);
        assert_eq!(bare.get("cpu"), Some(&json!(2)));
        assert!(coerce_object(json!([1]), &["data"]).is_empty());
    }

    #[test]
    fn first_number_reads_aliases_in_order() {
        let obj = coerce_object(json!({"cpu": "12.5", "cpuPercentage": 99}), &[]);
        assert_eq!(first_number(&obj, &["cpu_usage", "cpu", "cpuPercentage"]), Some(12.5));
        assert_eq!(first_number(&obj, &["missing"]), None);
    }
}
