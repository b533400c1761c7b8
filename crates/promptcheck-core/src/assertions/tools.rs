//! Tool-call assertions.
//!
//! A response with no tool metadata at all (`tool_calls: None`) fails every
//! tool assertion; an empty list means the model made no calls.

use serde_json::Value as JsonValue;

use super::{compare, path};
use crate::response::ToolCall;
use crate::types::{AssertionResult, ToolArgs, ToolCallAssertion, ToolCallOrder};

/// Diagnostic when the backend reported no tool-call metadata.
pub const TOOLS_NOT_REPORTED: &str = "tool calls not reported";

const CALL_KIND: &str = "tool-call";
const CALLS_KIND: &str = "tool-calls";

/// Exactly one call named `assertion.name`, with arguments per `assertion.args`.
pub fn evaluate_call(
    id: &str,
    assertion: &ToolCallAssertion,
    calls: Option<&[ToolCall]>,
) -> AssertionResult {
    let Some(calls) = calls else {
        return AssertionResult::fail(id, CALL_KIND, TOOLS_NOT_REPORTED);
    };

    let named: Vec<&ToolCall> = calls.iter().filter(|c| c.name == assertion.name).collect();
    let call = match named.as_slice() {
        [call] => *call,
        [] => {
            return AssertionResult::fail(
                id,
                CALL_KIND,
                format!(
                    "expected a call to '{}' but observed [{}]",
                    assertion.name,
                    join_names(calls)
                ),
            )
        }
        many => {
            return AssertionResult::fail(
                id,
                CALL_KIND,
                format!(
                    "expected exactly one call to '{}' but observed {}",
                    assertion.name,
                    many.len()
                ),
            )
        }
    };

    let outcome = match &assertion.args {
        None => Ok(()),
        Some(ToolArgs::Equals(expected)) => compare::equals(&call.args, expected),
        Some(ToolArgs::Subset(expected)) => deep_contains(&call.args, expected, "$"),
        Some(ToolArgs::Path(check)) => {
            let inner = path::evaluate(id, check, &call.args);
            if inner.passed {
                Ok(())
            } else {
                Err(inner.diagnostic)
            }
        }
    };

    let result = match outcome {
        Ok(()) => AssertionResult::pass(
            id,
            CALL_KIND,
            format!("'{}' called once with matching arguments", assertion.name),
        ),
        Err(reason) => AssertionResult::fail(
            id,
            CALL_KIND,
            format!("'{}' arguments: {}", assertion.name, reason),
        ),
    };
    result.with_extracted(call.args.clone())
}

/// The names of all calls, either in emitted order or as a multiset.
pub fn evaluate_sequence(
    id: &str,
    expected: &[String],
    order: ToolCallOrder,
    calls: Option<&[ToolCall]>,
) -> AssertionResult {
    let Some(calls) = calls else {
        return AssertionResult::fail(id, CALLS_KIND, TOOLS_NOT_REPORTED);
    };

    let mut observed: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
    let mut wanted: Vec<&str> = expected.iter().map(String::as_str).collect();
    if order == ToolCallOrder::AnyOrder {
        observed.sort_unstable();
        wanted.sort_unstable();
    }

    let label = match order {
        ToolCallOrder::InOrder => "in order",
        ToolCallOrder::AnyOrder => "in any order",
    };

    if observed == wanted {
        AssertionResult::pass(
            id,
            CALLS_KIND,
            format!("tool calls [{}] {}", join_names(calls), label),
        )
    } else {
        AssertionResult::fail(
            id,
            CALLS_KIND,
            format!(
                "expected tool calls [{}] {} but observed [{}]",
                expected.join(", "),
                label,
                join_names(calls)
            ),
        )
    }
}

/// Recursive subset match.
///
/// Objects: every expected key must be present and match. Arrays: the
/// observed array must be at least as long and match element-wise over the
/// expected prefix. Anything else: numeric-aware equality.
pub fn deep_contains(observed: &JsonValue, expected: &JsonValue, at: &str) -> Result<(), String> {
    match (observed, expected) {
        (JsonValue::Object(have), JsonValue::Object(want)) => {
            for (key, value) in want {
                let child = format!("{}.{}", at, key);
                match have.get(key) {
                    Some(found) => deep_contains(found, value, &child)?,
                    None => return Err(format!("missing key at {}", child)),
                }
            }
            Ok(())
        }
        (JsonValue::Array(have), JsonValue::Array(want)) => {
            if want.len() > have.len() {
                return Err(format!(
                    "expected at least {} element(s) at {} but observed {}",
                    want.len(),
                    at,
                    have.len()
                ));
            }
            want.iter()
                .zip(have)
                .enumerate()
                .try_for_each(|(i, (w, h))| deep_contains(h, w, &format!("{}[{}]", at, i)))
        }
        _ if compare::json_equal(observed, expected) => Ok(()),
        _ => Err(format!("expected {} but observed {} at {}", expected, observed, at)),
    }
}

fn join_names(calls: &[ToolCall]) -> String {
    calls
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Comparison, PathAssertion};
    use serde_json::json;

    fn calls() -> Vec<ToolCall> {
        vec![
            ToolCall::new(
                "get_weather",
                json!({"city": "Paris", "units": "metric", "days": [1, 2, 3]}),
            ),
            ToolCall::new("search", json!({"q": "umbrella"})),
        ]
    }

    fn call(name: &str, args: Option<ToolArgs>) -> ToolCallAssertion {
        ToolCallAssertion {
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_missing_metadata_fails() {
        let result = evaluate_call("t", &call("search", None), None);
        assert!(!result.passed);
        assert_eq!(result.diagnostic, TOOLS_NOT_REPORTED);

        let result = evaluate_sequence("t", &[], ToolCallOrder::InOrder, None);
        assert!(!result.passed);
    }

    #[test]
    fn test_call_requires_exactly_one() {
        let calls = calls();
        assert!(evaluate_call("t", &call("search", None), Some(calls.as_slice())).passed);

        let absent = evaluate_call("t", &call("book", None), Some(calls.as_slice()));
        assert!(!absent.passed);
        assert!(absent.diagnostic.contains("get_weather, search"), "{}", absent.diagnostic);

        let twice = vec![calls[1].clone(), calls[1].clone()];
        let result = evaluate_call("t", &call("search", None), Some(twice.as_slice()));
        assert!(!result.passed);
        assert!(result.diagnostic.contains("exactly one"));
    }

    #[test]
    fn test_args_equals_and_subset() {
        let calls = calls();
        let exact = call("search", Some(ToolArgs::Equals(json!({"q": "umbrella"}))));
        assert!(evaluate_call("t", &exact, Some(calls.as_slice())).passed);

        let partial = call("get_weather", Some(ToolArgs::Equals(json!({"city": "Paris"}))));
        assert!(!evaluate_call("t", &partial, Some(calls.as_slice())).passed);

        let subset = call(
            "get_weather",
            Some(ToolArgs::Subset(json!({"city": "Paris", "days": [1, 2]}))),
        );
        let result = evaluate_call("t", &subset, Some(calls.as_slice()));
        assert!(result.passed, "{}", result.diagnostic);
        assert_eq!(result.extracted.as_ref().unwrap()["city"], "Paris");

        let wrong = call("get_weather", Some(ToolArgs::Subset(json!({"units": "imperial"}))));
        let result = evaluate_call("t", &wrong, Some(calls.as_slice()));
        assert!(!result.passed);
        assert!(result.diagnostic.contains("$.units"), "{}", result.diagnostic);
    }

    #[test]
    fn test_args_path() {
        let calls = calls();
        let check = call(
            "get_weather",
            Some(ToolArgs::Path(PathAssertion {
                path: "$.days[*]".to_string(),
                comparison: Comparison::NumericRange {
                    min: Some(1.0),
                    max: Some(7.0),
                },
            })),
        );
        assert!(evaluate_call("t", &check, Some(calls.as_slice())).passed);
    }

    #[test]
    fn test_sequence_order() {
        let calls = calls();
        let in_order = ["get_weather".to_string(), "search".to_string()];
        let swapped = ["search".to_string(), "get_weather".to_string()];

        assert!(evaluate_sequence("t", &in_order, ToolCallOrder::InOrder, Some(calls.as_slice())).passed);
        assert!(!evaluate_sequence("t", &swapped, ToolCallOrder::InOrder, Some(calls.as_slice())).passed);
        assert!(evaluate_sequence("t", &swapped, ToolCallOrder::AnyOrder, Some(calls.as_slice())).passed);
        assert!(!evaluate_sequence("t", &swapped[..1], ToolCallOrder::AnyOrder, Some(calls.as_slice())).passed);
        assert!(evaluate_sequence("t", &[], ToolCallOrder::InOrder, Some(&[][..])).passed);
    }

    #[test]
    fn test_deep_contains_arrays_and_numbers() {
        assert!(deep_contains(&json!([1, 2, 3]), &json!([1.0, 2]), "$").is_ok());
        assert!(deep_contains(&json!([1]), &json!([1, 2]), "$").is_err());
        assert!(deep_contains(&json!({"a": {"b": 1, "c": 2}}), &json!({"a": {"b": 1}}), "$").is_ok());
        let err = deep_contains(&json!({"a": {"b": 1}}), &json!({"a": {"x": 1}}), "$").unwrap_err();
        assert_eq!(err, "missing key at $.a.x");
    }
}
