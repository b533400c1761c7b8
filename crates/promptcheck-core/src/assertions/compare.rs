//! Value comparison for path assertions.
//!
//! No implicit coercions: a string `"3"` never equals the number `3`, and a
//! numeric range never parses strings. The only normalization is numeric:
//! `1` and `1.0` are the same JSON number.

use regex::Regex;
use serde_json::Value as JsonValue;

/// Structural equality where numbers compare by value.
pub fn json_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                match (x.as_f64(), y.as_f64()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                }
            }
        }
        (JsonValue::Array(xs), JsonValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (JsonValue::Object(xs), JsonValue::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

/// `equals`: `Ok` on match, otherwise the observed-vs-expected reason.
pub fn equals(observed: &JsonValue, expected: &JsonValue) -> Result<(), String> {
    if json_equal(observed, expected) {
        Ok(())
    } else {
        Err(format!("expected {} but observed {}", expected, observed))
    }
}

/// `contains`, by observed type:
/// - string: `expected` must be a string and a substring
/// - array: some element equals `expected`
/// - object: `expected` must be a string naming a present key
pub fn contains(observed: &JsonValue, expected: &JsonValue) -> Result<(), String> {
    match (observed, expected) {
        (JsonValue::String(haystack), JsonValue::String(needle)) => {
            if haystack.contains(needle.as_str()) {
                Ok(())
            } else {
                Err(format!("expected {} to contain {}", observed, expected))
            }
        }
        (JsonValue::String(_), _) => Err(format!(
            "cannot test string {} for non-string {}",
            observed, expected
        )),
        (JsonValue::Array(items), _) => {
            if items.iter().any(|item| json_equal(item, expected)) {
                Ok(())
            } else {
                Err(format!("expected {} to contain element {}", observed, expected))
            }
        }
        (JsonValue::Object(map), JsonValue::String(key)) => {
            if map.contains_key(key) {
                Ok(())
            } else {
                Err(format!("expected {} to contain key {}", observed, expected))
            }
        }
        (JsonValue::Object(_), _) => Err(format!(
            "object membership needs a string key, got {}",
            expected
        )),
        _ => Err(format!(
            "contains is not applicable to {} value {}",
            type_name(observed),
            observed
        )),
    }
}

/// `regex-match` on the string representation (strings without quotes).
pub fn regex_match(observed: &JsonValue, pattern: &Regex) -> Result<(), String> {
    let repr = string_repr(observed);
    if pattern.is_match(&repr) {
        Ok(())
    } else {
        Err(format!("expected {} to match /{}/", observed, pattern.as_str()))
    }
}

/// `numeric-range`: inclusive bounds, either side optional.
pub fn numeric_range(observed: &JsonValue, min: Option<f64>, max: Option<f64>) -> Result<(), String> {
    let Some(n) = observed.as_f64() else {
        return Err(format!(
            "expected a number in {} but observed non-numeric {}",
            describe_range(min, max),
            observed
        ));
    };

    let above_min = min.map_or(true, |lo| n >= lo);
    let below_max = max.map_or(true, |hi| n <= hi);

    if above_min && below_max {
        Ok(())
    } else {
        Err(format!(
            "expected a number in {} but observed {}",
            describe_range(min, max),
            observed
        ))
    }
}

pub fn string_repr(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn describe_range(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("[{}, {}]", lo, hi),
        (Some(lo), None) => format!("[{}, +inf)", lo),
        (None, Some(hi)) => format!("(-inf, {}]", hi),
        (None, None) => "(-inf, +inf)".to_string(),
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
