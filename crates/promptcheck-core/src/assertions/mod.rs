//! Assertion evaluation.
//!
//! Evaluation is a pure query: `(assertion, response) -> AssertionResult`.
//! It never mutates either input, never performs I/O, and never errors. An
//! assertion that cannot be checked (bad pattern, unstructured body, ...) is
//! reported as a failed result with a diagnostic.
//!
//! | Kind | Module |
//! |------|--------|
//! | `schema` | [`schema`] |
//! | `path` | [`path`] + [`compare`] |
//! | `text` | [`text`] |
//! | `guardrail` | [`guardrail`] |
//! | `tool-call`, `tool-calls` | [`tools`] |
//! | `latency`, `token-usage`, `cost` | here |

pub mod compare;
pub mod guardrail;
pub mod path;
pub mod schema;
pub mod text;
pub mod tools;

use crate::response::ModelResponse;
use crate::types::{positional_id, Assertion, AssertionResult, Check};

/// Diagnostic for structural assertions against an unparseable body.
pub const NOT_STRUCTURED: &str = "response not structured";

/// Evaluate one assertion against a response.
pub fn evaluate(assertion: &Assertion, response: &ModelResponse) -> AssertionResult {
    let id = assertion.id.as_str();
    let kind = assertion.check.kind();

    let result = match (&assertion.check, response.json.as_ref()) {
        (Check::Schema(check), Some(body)) => schema::evaluate(id, &check.schema, body),
        (Check::Path(check), Some(body)) => path::evaluate(id, check, body),
        (Check::Schema(_), None) | (Check::Path(_), None) => {
            AssertionResult::fail(id, kind, NOT_STRUCTURED)
        }
        (Check::Text { mode, value }, _) => text::evaluate(id, *mode, value, &response.text),
        (
            Check::Guardrail {
                rule,
                expect_violation,
            },
            _,
        ) => {
            if *expect_violation {
                guardrail::evaluate_violation(id, rule, &response.text)
            } else {
                guardrail::evaluate(id, rule, &response.text)
            }
        }
        (Check::ToolCall(check), _) => {
            tools::evaluate_call(id, check, response.metadata.tool_calls.as_deref())
        }
        (Check::ToolCalls { names, order }, _) => {
            tools::evaluate_sequence(id, names, *order, response.metadata.tool_calls.as_deref())
        }
        (Check::Cost { max_usd }, _) => evaluate_cost(id, *max_usd, response),
        (Check::Latency { max_ms }, _) => evaluate_latency(id, *max_ms, response),
        (Check::TokenUsage { max_tokens }, _) => evaluate_tokens(id, *max_tokens, response),
    };

    tracing::debug!(
        assertion = %result.assertion_id,
        kind,
        passed = result.passed,
        "Assertion evaluated"
    );

    result
}

/// Evaluate assertions in declared order.
///
/// Assertions without an identifier are reported under their positional id.
pub fn evaluate_all(assertions: &[Assertion], response: &ModelResponse) -> Vec<AssertionResult> {
    assertions
        .iter()
        .enumerate()
        .map(|(index, assertion)| {
            let mut result = evaluate(assertion, response);
            if result.assertion_id.is_empty() {
                result.assertion_id = positional_id(index);
            }
            result
        })
        .collect()
}

fn evaluate_latency(id: &str, max_ms: u64, response: &ModelResponse) -> AssertionResult {
    let observed = response.metadata.latency.as_millis();
    if observed <= u128::from(max_ms) {
        AssertionResult::pass(id, "latency", format!("latency {}ms <= {}ms", observed, max_ms))
    } else {
        AssertionResult::fail(
            id,
            "latency",
            format!("expected latency <= {}ms but observed {}ms", max_ms, observed),
        )
    }
}

fn evaluate_tokens(id: &str, max_tokens: u64, response: &ModelResponse) -> AssertionResult {
    match response.metadata.total_tokens() {
        None => AssertionResult::fail(id, "token-usage", "token usage not reported"),
        Some(total) if total <= max_tokens => AssertionResult::pass(
            id,
            "token-usage",
            format!("token usage {} <= {}", total, max_tokens),
        ),
        Some(total) => AssertionResult::fail(
            id,
            "token-usage",
            format!("expected token usage <= {} but observed {}", max_tokens, total),
        ),
    }
}

fn evaluate_cost(id: &str, max_usd: f64, response: &ModelResponse) -> AssertionResult {
    match response.metadata.cost_usd {
        None => AssertionResult::fail(id, "cost", "cost not reported"),
        Some(cost) if cost <= max_usd => {
            AssertionResult::pass(id, "cost", format!("cost ${:.6} <= ${:.6}", cost, max_usd))
        }
        Some(cost) => AssertionResult::fail(
            id,
            "cost",
            format!("expected cost <= ${:.6} but observed ${:.6}", max_usd, cost),
        ),
    }
}
