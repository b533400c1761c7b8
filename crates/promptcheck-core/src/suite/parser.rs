//! Suite parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_json_path::JsonPath;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::schema::validate_suite_schema;
use crate::assertions::schema as schema_assertion;
use crate::template;
use crate::types::{Check, Comparison, GuardrailRule, PathAssertion, TestCase, TextMode, ToolArgs};

/// Errors that can occur when loading a suite document.
#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("Failed to read suite file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Suite does not match schema:\n  {}", .0.join("\n  "))]
    SchemaViolations(Vec<String>),

    #[error("Duplicate case ID: {0}")]
    DuplicateCase(String),

    #[error("Duplicate assertion ID '{assertion}' in case '{case}'")]
    DuplicateAssertion { case: String, assertion: String },

    #[error("Invalid case '{case}': {detail}")]
    InvalidCase { case: String, detail: String },

    #[error("Invalid assertion '{assertion}' in case '{case}': {detail}")]
    InvalidAssertion {
        case: String,
        assertion: String,
        detail: String,
    },
}

/// A loaded suite: named cases plus the settings and provider configuration
/// the runtime needs to execute them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    /// Human-readable name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Engine settings, interpreted by the runtime
    #[serde(default)]
    pub settings: JsonValue,

    /// Provider selector to gateway configuration (`type` plus provider keys)
    #[serde(default)]
    pub providers: BTreeMap<String, JsonValue>,

    /// Cases in declared order
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

impl Suite {
    /// Parse a suite from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SuiteError> {
        let document: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(document)
    }

    /// Parse a suite from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SuiteError> {
        let document: JsonValue = serde_json::from_str(json)?;
        Self::from_value(document)
    }

    /// Parse a suite from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SuiteError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a suite from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SuiteError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load a suite file, choosing the format by extension (`.json` is JSON,
    /// anything else is read as YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SuiteError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    /// Schema-check, deserialize, number assertions and validate.
    pub fn from_value(document: JsonValue) -> Result<Self, SuiteError> {
        validate_suite_schema(&document).map_err(SuiteError::SchemaViolations)?;

        let mut suite: Suite = serde_json::from_value(document)?;
        for case in &mut suite.cases {
            case.assign_assertion_ids();
        }

        suite.validate()?;
        Ok(suite)
    }

    /// Look up a case by id.
    pub fn case(&self, id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Placeholders that no `vars` entry resolves, as `(case id, name)`.
    ///
    /// These are not load errors: such a case fails at run time with a
    /// configuration error and the rest of the suite still runs.
    pub fn unresolved_placeholders(&self) -> Vec<(String, String)> {
        let mut unresolved = Vec::new();
        for case in &self.cases {
            let templates = std::iter::once(case.prompt.as_str()).chain(case.system.as_deref());
            let mut seen = HashSet::new();
            for name in templates.flat_map(template::placeholders) {
                if !case.vars.contains_key(&name) && seen.insert(name.clone()) {
                    unresolved.push((case.id.clone(), name));
                }
            }
        }
        unresolved
    }

    fn validate(&self) -> Result<(), SuiteError> {
        let mut case_ids = HashSet::new();

        for case in &self.cases {
            if !case_ids.insert(case.id.as_str()) {
                return Err(SuiteError::DuplicateCase(case.id.clone()));
            }

            if case.timeout == Some(Duration::ZERO) {
                return Err(SuiteError::InvalidCase {
                    case: case.id.clone(),
                    detail: "timeout must be greater than zero".to_string(),
                });
            }

            let mut assertion_ids = HashSet::new();
            for assertion in &case.assertions {
                if !assertion_ids.insert(assertion.id.as_str()) {
                    return Err(SuiteError::DuplicateAssertion {
                        case: case.id.clone(),
                        assertion: assertion.id.clone(),
                    });
                }

                check_compiles(&assertion.check).map_err(|detail| {
                    SuiteError::InvalidAssertion {
                        case: case.id.clone(),
                        assertion: assertion.id.clone(),
                        detail,
                    }
                })?;
            }
        }

        Ok(())
    }
}

/// Paths must parse, patterns must compile, schema documents must compile.
fn check_compiles(check: &Check) -> Result<(), String> {
    match check {
        Check::Schema(s) => schema_assertion::compile(&s.schema).map(|_| ()),
        Check::Path(p) => check_path(p),
        Check::ToolCall(call) => match &call.args {
            Some(ToolArgs::Path(p)) => check_path(p),
            _ => Ok(()),
        },
        Check::Text {
            mode: TextMode::Regex,
            value,
        } => compile_pattern(value),
        Check::Guardrail {
            rule: GuardrailRule::DisallowedRegex(patterns),
            ..
        } => patterns.iter().try_for_each(|p| compile_pattern(p)),
        Check::Cost { max_usd } if !max_usd.is_finite() || *max_usd < 0.0 => {
            Err(format!("cost ceiling must be a non-negative amount, got {}", max_usd))
        }
        _ => Ok(()),
    }
}

fn check_path(p: &PathAssertion) -> Result<(), String> {
    JsonPath::parse(&p.path).map_err(|e| format!("invalid path expression '{}': {}", p.path, e))?;
    match &p.comparison {
        Comparison::RegexMatch(pattern) => compile_pattern(pattern),
        Comparison::NumericRange {
            min: Some(min),
            max: Some(max),
        } if min > max => Err(format!("numeric-range min {} exceeds max {}", min, max)),
        _ => Ok(()),
    }
}

fn compile_pattern(pattern: &str) -> Result<(), String> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| format!("invalid pattern /{}/: {}", pattern, e))
}
