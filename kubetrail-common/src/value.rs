//! Structural equality over semi-structured object subtrees
//!
//! Object bodies are kept as `serde_json::Value` trees. Comparison walks the
//! tree instead of comparing serialized text, so key order never matters and
//! integral numbers compare equal to their float spelling.

use serde_json::{Map, Value};

/// Deep structural equality of two value trees.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => maps_equal(x, y),
        _ => false,
    }
}

fn maps_equal(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| deep_equal(value, other)))
}

/// Whether a mapping-valued field differs between two revisions.
///
/// A field that is absent, or present but not a mapping, counts as absent.
/// Absent in both is unchanged; absent in exactly one is changed.
pub fn mapping_changed(old: Option<&Value>, new: Option<&Value>) -> bool {
    let old = old.and_then(Value::as_object);
    let new = new.and_then(Value::as_object);

    match (old, new) {
        (None, None) => false,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(old), Some(new)) => !maps_equal(old, new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_equal_ignores_key_order() {
        let a = json!({"a": 1, "b": {"c": [1, 2, {"d": null}]}});
        let b = json!({"b": {"c": [1, 2, {"d": null}]}, "a": 1});
        assert!(deep_equal(&a, &b));
    }

    #[test]
    fn test_deep_equal_sequence_order_matters() {
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn test_deep_equal_numbers_by_value() {
        assert!(deep_equal(&json!(1), &json!(1.0)));
        assert!(!deep_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_mapping_changed_absence_rules() {
        let m = json!({"phase": "Running"});
        assert!(!mapping_changed(None, None));
        assert!(mapping_changed(Some(&m), None));
        assert!(mapping_changed(None, Some(&m)));
        assert!(!mapping_changed(Some(&m), Some(&m.clone())));
    }

    #[test]
    fn test_mapping_changed_malformed_counts_as_absent() {
        let malformed = json!("not-a-map");
        assert!(!mapping_changed(Some(&malformed), None));
        assert!(mapping_changed(Some(&malformed), Some(&json!({}))));
    }
}
