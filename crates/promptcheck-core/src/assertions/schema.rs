//! Schema assertions.
//!
//! The body is validated against the supplied JSON Schema document and every
//! violation is reported, not just the first.

use serde_json::Value as JsonValue;

use crate::types::AssertionResult;

const KIND: &str = "schema";

/// Compile a schema document, returning the compiler's message on failure.
pub fn compile(schema: &JsonValue) -> Result<jsonschema::Validator, String> {
    jsonschema::options()
        .build(schema)
        .map_err(|e| format!("Failed to compile schema: {}", e))
}

/// All violations of `schema` by `body`, as `"<message> at <instance path>"`.
pub fn violations(validator: &jsonschema::Validator, body: &JsonValue) -> Vec<String> {
    validator
        .iter_errors(body)
        .map(|e| {
            let location = e.instance_path.to_string();
            if location.is_empty() {
                format!("{} at /", e)
            } else {
                format!("{} at {}", e, location)
            }
        })
        .collect()
}

pub fn evaluate(id: &str, schema: &JsonValue, body: &JsonValue) -> AssertionResult {
    let validator = match compile(schema) {
        Ok(v) => v,
        Err(e) => return AssertionResult::fail(id, KIND, format!("invalid schema document: {}", e)),
    };

    let errors = violations(&validator, body);

    if errors.is_empty() {
        AssertionResult::pass(id, KIND, "response conforms to schema")
    } else {
        AssertionResult::fail(
            id,
            KIND,
            format!(
                "response violates schema ({} violation(s)): {}",
                errors.len(),
                errors.join("; ")
            ),
        )
    }
}
