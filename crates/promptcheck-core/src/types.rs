//! Core types: test cases, assertions, verdicts and suite results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::dispatch::DispatchError;

/// One declarative prompt-verification unit.
///
/// Immutable once loaded; the orchestrator only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    /// Unique within a suite
    pub id: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Prompt template; `{{name}}` placeholders resolve from `vars`
    pub prompt: String,

    /// Optional system prompt template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Provider selector, resolved against the suite's gateway map
    pub provider: String,

    /// Model override for the selected provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Provider-specific parameters (temperature, max_tokens, ...)
    #[serde(default)]
    pub params: BTreeMap<String, JsonValue>,

    /// Template variables
    #[serde(default)]
    pub vars: BTreeMap<String, JsonValue>,

    /// Ordered assertions; empty means vacuously passing once a response arrives
    #[serde(default)]
    pub assertions: Vec<Assertion>,

    /// Per-attempt timeout override
    #[serde(
        default,
        with = "crate::durations::human_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl TestCase {
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: None,
            prompt: prompt.into(),
            system: None,
            provider: provider.into(),
            model: None,
            params: BTreeMap::new(),
            vars: BTreeMap::new(),
            assertions: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Give every assertion without an identifier a positional one (`a1`, `a2`, ...).
    pub fn assign_assertion_ids(&mut self) {
        for (index, assertion) in self.assertions.iter_mut().enumerate() {
            if assertion.id.is_empty() {
                assertion.id = positional_id(index);
            }
        }
    }
}

pub(crate) fn positional_id(index: usize) -> String {
    format!("a{}", index + 1)
}

/// An expectation on a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assertion {
    /// Identifier reported in results; defaults to the position in the case
    #[serde(default)]
    pub id: String,

    #[serde(flatten)]
    pub check: Check,
}

impl Assertion {
    pub fn new(id: impl Into<String>, check: Check) -> Self {
        Self {
            id: id.into(),
            check,
        }
    }

    pub fn schema(id: impl Into<String>, schema: JsonValue) -> Self {
        Self::new(id, Check::Schema(SchemaAssertion { schema }))
    }

    pub fn path(id: impl Into<String>, path: impl Into<String>, comparison: Comparison) -> Self {
        Self::new(
            id,
            Check::Path(PathAssertion {
                path: path.into(),
                comparison,
            }),
        )
    }

    pub fn text(id: impl Into<String>, mode: TextMode, value: impl Into<String>) -> Self {
        Self::new(
            id,
            Check::Text {
                mode,
                value: value.into(),
            },
        )
    }
}

/// The closed set of assertion kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Check {
    /// The structured body must satisfy a JSON Schema document
    Schema(SchemaAssertion),

    /// A path query over the structured body, compared per mode
    Path(PathAssertion),

    /// A check on the raw response text
    Text { mode: TextMode, value: String },

    /// Content that must not appear in the raw response text; with
    /// `expect_violation` the rule must be tripped instead
    Guardrail {
        rule: GuardrailRule,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        expect_violation: bool,
    },

    /// Exactly one tool call with this name, optionally with matching arguments
    ToolCall(ToolCallAssertion),

    /// The complete list of tool call names
    ToolCalls {
        names: Vec<String>,
        #[serde(default)]
        order: ToolCallOrder,
    },

    /// Inclusive ceiling on reported cost in USD
    Cost { max_usd: f64 },

    /// Inclusive ceiling on provider-reported latency
    Latency { max_ms: u64 },

    /// Inclusive ceiling on total tokens
    TokenUsage { max_tokens: u64 },
}

impl Check {
    pub fn kind(&self) -> &'static str {
        match self {
            Check::Schema(_) => "schema",
            Check::Path(_) => "path",
            Check::Text { .. } => "text",
            Check::Guardrail { .. } => "guardrail",
            Check::Latency { .. } => "latency",
            Check::TokenUsage { .. } => "token-usage",
            Check::ToolCall(_) => "tool-call",
            Check::ToolCalls { .. } => "tool-calls",
            Check::Cost { .. } => "cost",
        }
    }

    /// Whether this check needs a structured (JSON) body.
    pub fn requires_structure(&self) -> bool {
        matches!(self, Check::Schema(_) | Check::Path(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaAssertion {
    /// JSON Schema document
    pub schema: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathAssertion {
    /// JSONPath query (RFC 9535), e.g. `$.items[*].name`
    pub path: String,

    #[serde(flatten)]
    pub comparison: Comparison,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallAssertion {
    /// Tool name; the response must carry exactly one call by this name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<ToolArgs>,
}

/// How a tool call's arguments are checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolArgs {
    /// Deep equality with the whole argument value
    Equals(JsonValue),

    /// Every key in the expected object (recursively) is present and equal;
    /// arrays compare element-wise over the expected prefix
    Subset(JsonValue),

    /// A path assertion evaluated against the argument value
    Path(PathAssertion),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallOrder {
    #[default]
    InOrder,
    AnyOrder,
}

/// How matched nodes are compared.
///
/// `equals`, `regex-match` and `numeric-range` must hold for every match;
/// `contains` must hold for at least one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Comparison {
    /// Value equality by JSON type; numbers compare by numeric value
    Equals(JsonValue),

    /// Substring for strings, element membership for arrays, key presence for objects
    Contains(JsonValue),

    /// Pattern match on the string representation
    RegexMatch(String),

    /// Inclusive bounds; non-numeric observations fail
    NumericRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

impl Comparison {
    pub fn mode(&self) -> &'static str {
        match self {
            Comparison::Equals(_) => "equals",
            Comparison::Contains(_) => "contains",
            Comparison::RegexMatch(_) => "regex-match",
            Comparison::NumericRange { .. } => "numeric-range",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TextMode {
    Contains,
    ContainsIgnoreCase,
    NotContains,
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum GuardrailRule {
    /// Emails, phone numbers, card numbers and API-key-like tokens
    Pii,

    /// Any of the listed patterns
    DisallowedRegex(Vec<String>),
}

/// Outcome of evaluating one assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionResult {
    pub assertion_id: String,

    /// Assertion kind (`schema`, `path`, ...)
    pub kind: String,

    pub passed: bool,

    /// What was expected vs. what was observed
    pub diagnostic: String,

    /// Extracted value for path assertions; an array when several nodes matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<JsonValue>,
}

impl AssertionResult {
    pub fn pass(id: impl Into<String>, kind: &str, diagnostic: impl Into<String>) -> Self {
        Self {
            assertion_id: id.into(),
            kind: kind.to_string(),
            passed: true,
            diagnostic: diagnostic.into(),
            extracted: None,
        }
    }

    pub fn fail(id: impl Into<String>, kind: &str, diagnostic: impl Into<String>) -> Self {
        Self {
            assertion_id: id.into(),
            kind: kind.to_string(),
            passed: false,
            diagnostic: diagnostic.into(),
            extracted: None,
        }
    }

    pub fn with_extracted(mut self, value: JsonValue) -> Self {
        self.extracted = Some(value);
        self
    }
}

/// Why a case ended without any assertion being evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    /// Every attempt failed, or the first failure was terminal
    Dispatch { error: DispatchError },

    /// Unknown provider selector or unresolvable template
    Configuration { detail: String },

    /// The suite deadline elapsed before the case could finish
    SuiteTimeout,

    /// The worker running the case died
    Aborted { detail: String },
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::Dispatch { error } => write!(f, "dispatch failed: {}", error),
            FailureCause::Configuration { detail } => write!(f, "configuration error: {}", detail),
            FailureCause::SuiteTimeout => write!(f, "suite deadline elapsed"),
            FailureCause::Aborted { detail } => write!(f, "aborted: {}", detail),
        }
    }
}

/// Three-way outcome of a case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    /// A response was obtained and at least one assertion failed
    Failed,
    /// No response was obtained
    Errored,
}

/// The complete outcome of running one test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub case_id: String,

    /// True iff a response was obtained and every assertion passed
    pub passed: bool,

    pub results: Vec<AssertionResult>,

    /// Dispatch attempts made
    pub attempts: u32,

    #[serde(rename = "elapsed_ms", with = "crate::durations::millis")]
    pub elapsed: Duration,

    /// Set when the case failed before any assertion could run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCause>,
}

impl Verdict {
    /// Verdict for a case whose response was evaluated.
    pub fn evaluated(
        case_id: impl Into<String>,
        results: Vec<AssertionResult>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            passed: results.iter().all(|r| r.passed),
            results,
            attempts,
            elapsed,
            failure: None,
        }
    }

    /// Verdict for a case that never obtained a response.
    pub fn no_response(
        case_id: impl Into<String>,
        cause: FailureCause,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            passed: false,
            results: Vec::new(),
            attempts,
            elapsed,
            failure: Some(cause),
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.failure.is_some() {
            Outcome::Errored
        } else if self.passed {
            Outcome::Passed
        } else {
            Outcome::Failed
        }
    }

    /// Failed assertion results.
    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Pass/fail/error counts; always derived from the verdict list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuiteCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteResult {
    /// In declared case order
    pub verdicts: Vec<Verdict>,

    pub counts: SuiteCounts,

    /// Wall-clock duration of the run
    #[serde(rename = "duration_ms", with = "crate::durations::millis")]
    pub duration: Duration,

    pub finished_at: DateTime<Utc>,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.counts.passed == self.counts.total
    }

    /// Verdicts that did not pass, in declared order.
    pub fn failures(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }
}
