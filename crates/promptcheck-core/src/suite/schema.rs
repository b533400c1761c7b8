//! JSON Schema validation for suite documents.
//!
//! Every document is checked against `schema/suite.schema.json` before it is
//! deserialized, so structural mistakes are reported all at once with their
//! location instead of as the first serde error.

use std::sync::OnceLock;

/// Embedded suite schema (loaded at compile time).
const SUITE_SCHEMA_JSON: &str = include_str!("../../../../schema/suite.schema.json");

/// Compiled validator, initialized once and shared by every load.
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(SUITE_SCHEMA_JSON)
            .map_err(|e| format!("Invalid suite schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile suite schema: {}", e))
    });

    result.as_ref().map_err(|e| e.clone())
}

/// Validate a suite document against the schema.
///
/// Returns every violation as `"<message> at <instance path>"`.
pub fn validate_suite_schema(document: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| {
            let location = e.instance_path.to_string();
            format!("{} at {}", e, if location.is_empty() { "/" } else { &location })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
