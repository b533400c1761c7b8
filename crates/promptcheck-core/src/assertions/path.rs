//! Path assertions: JSONPath extraction plus comparison.
//!
//! | Matches | Result |
//! |---------|--------|
//! | 0 | fail, "path not found" |
//! | 1 | compare that node |
//! | n | `contains`: any node; every other mode: all nodes |

use regex::Regex;
use serde_json::Value as JsonValue;
use serde_json_path::JsonPath;

use super::compare;
use crate::types::{AssertionResult, Comparison, PathAssertion};

/// Diagnostic for a query that matched nothing.
pub const PATH_NOT_FOUND: &str = "path not found";

const KIND: &str = "path";

/// Evaluate a path assertion against a structured body.
pub fn evaluate(id: &str, assertion: &PathAssertion, body: &JsonValue) -> AssertionResult {
    let query = match JsonPath::parse(&assertion.path) {
        Ok(q) => q,
        Err(e) => {
            return AssertionResult::fail(
                id,
                KIND,
                format!("invalid path expression '{}': {}", assertion.path, e),
            )
        }
    };

    let regex = match &assertion.comparison {
        Comparison::RegexMatch(pattern) => match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                return AssertionResult::fail(
                    id,
                    KIND,
                    format!("invalid pattern /{}/: {}", pattern, e),
                )
            }
        },
        _ => None,
    };

    let matches: Vec<&JsonValue> = query.query(body).all();

    if matches.is_empty() {
        return AssertionResult::fail(id, KIND, format!("{}: {}", PATH_NOT_FOUND, assertion.path));
    }

    let extracted = if matches.len() == 1 {
        matches[0].clone()
    } else {
        JsonValue::Array(matches.iter().map(|v| (*v).clone()).collect())
    };

    let check = |value: &JsonValue| -> Result<(), String> {
        match &assertion.comparison {
            Comparison::Equals(expected) => compare::equals(value, expected),
            Comparison::Contains(expected) => compare::contains(value, expected),
            Comparison::RegexMatch(_) => match &regex {
                Some(re) => compare::regex_match(value, re),
                None => Err("pattern unavailable".to_string()),
            },
            Comparison::NumericRange { min, max } => compare::numeric_range(value, *min, *max),
        }
    };

    let mode = assertion.comparison.mode();
    let outcome = match &assertion.comparison {
        Comparison::Contains(_) => any_match(&matches, check),
        _ => all_match(&matches, check),
    };

    let result = match outcome {
        Ok(()) => AssertionResult::pass(
            id,
            KIND,
            format!(
                "{} holds for {} match(es) at {}",
                mode,
                matches.len(),
                assertion.path
            ),
        ),
        Err(reason) => AssertionResult::fail(id, KIND, format!("{} at {}", reason, assertion.path)),
    };

    result.with_extracted(extracted)
}

fn all_match<F>(matches: &[&JsonValue], check: F) -> Result<(), String>
where
    F: Fn(&JsonValue) -> Result<(), String>,
{
    let failures: Vec<String> = matches
        .iter()
        .enumerate()
        .filter_map(|(i, v)| check(v).err().map(|e| (i, e)))
        .map(|(i, e)| {
            if matches.len() > 1 {
                format!("match #{}: {}", i, e)
            } else {
                e
            }
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures.join("; "))
    }
}

fn any_match<F>(matches: &[&JsonValue], check: F) -> Result<(), String>
where
    F: Fn(&JsonValue) -> Result<(), String>,
{
    let mut reasons = Vec::new();
    for value in matches {
        match check(value) {
            Ok(()) => return Ok(()),
            Err(e) => reasons.push(e),
        }
    }

    if matches.len() == 1 {
        Err(reasons.remove(0))
    } else {
        Err(format!("no match satisfied contains: {}", reasons.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assertion(path: &str, comparison: Comparison) -> PathAssertion {
        PathAssertion {
            path: path.to_string(),
            comparison,
        }
    }

    #[test]
    fn test_single_match_equals() {
        let body = json!({"status": "ok"});
        let result = evaluate("a1", &assertion("$.status", Comparison::Equals(json!("ok"))), &body);
        assert!(result.passed);
        assert_eq!(result.extracted, Some(json!("ok")));
    }

    #[test]
    fn test_single_match_mismatch() {
        let body = json!({"status": "error"});
        let result = evaluate("a1", &assertion("$.status", Comparison::Equals(json!("ok"))), &body);
        assert!(!result.passed);
        assert!(result.diagnostic.contains("expected \"ok\" but observed \"error\""));
        assert_eq!(result.extracted, Some(json!("error")));
    }

    #[test]
    fn test_zero_matches_is_path_not_found() {
        let body = json!({"status": "ok"});
        for comparison in [
            Comparison::Equals(json!("ok")),
            Comparison::Contains(json!("o")),
            Comparison::RegexMatch(".*".into()),
            Comparison::NumericRange { min: None, max: None },
        ] {
            let result = evaluate("a1", &assertion("$.missing", comparison), &body);
            assert!(!result.passed);
            assert!(result.diagnostic.starts_with(PATH_NOT_FOUND));
            assert_eq!(result.extracted, None);
        }
    }

    #[test]
    fn test_multi_match_equals_requires_all() {
        let body = json!({"items": [{"ok": true}, {"ok": true}, {"ok": false}]});
        let result = evaluate(
            "a1",
            &assertion("$.items[*].ok", Comparison::Equals(json!(true))),
            &body,
        );
        assert!(!result.passed);
        assert!(result.diagnostic.contains("match #2"));
        assert_eq!(result.extracted, Some(json!([true, true, false])));
    }

    #[test]
    fn test_multi_match_contains_requires_any() {
        let body = json!({"items": [{"name": "alpha"}, {"name": "beta"}]});
        let hit = evaluate(
            "a1",
            &assertion("$.items[*].name", Comparison::Contains(json!("et"))),
            &body,
        );
        assert!(hit.passed);

        let miss = evaluate(
            "a1",
            &assertion("$.items[*].name", Comparison::Contains(json!("zeta"))),
            &body,
        );
        assert!(!miss.passed);
    }

    #[test]
    fn test_multi_match_range_and_regex() {
        let body = json!({"scores": [0.1, 0.5, 0.9], "codes": ["A1", "B2"]});
        let in_range = evaluate(
            "a1",
            &assertion("$.scores[*]", Comparison::NumericRange { min: Some(0.0), max: Some(1.0) }),
            &body,
        );
        assert!(in_range.passed);

        let out_of_range = evaluate(
            "a1",
            &assertion("$.scores[*]", Comparison::NumericRange { min: Some(0.2), max: None }),
            &body,
        );
        assert!(!out_of_range.passed);

        let codes = evaluate(
            "a1",
            &assertion("$.codes[*]", Comparison::RegexMatch("^[A-Z][0-9]$".into())),
            &body,
        );
        assert!(codes.passed);
    }

    #[test]
    fn test_invalid_path_expression() {
        let body = json!({});
        let result = evaluate("a1", &assertion("$[", Comparison::Equals(json!(1))), &body);
        assert!(!result.passed);
        assert!(result.diagnostic.contains("invalid path expression"));
    }

    #[test]
    fn test_invalid_regex() {
        let body = json!({"a": "x"});
        let result = evaluate("a1", &assertion("$.a", Comparison::RegexMatch("(".into())), &body);
        assert!(!result.passed);
        assert!(result.diagnostic.contains("invalid pattern"));
    }
}
