//! Model responses and structured-value extraction.
//!
//! Models wrap JSON in prose or markdown fences more often than not, so the
//! structured value is recovered in stages: the whole body, a ```json fence,
//! any fence that looks like JSON, then the first balanced `{..}` / `[..]`.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

lazy_static! {
    static ref JSON_FENCE: Regex = Regex::new(r"(?is)```json\s*(.*?)```").unwrap();
    static ref ANY_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)```").unwrap();
}

/// Provider-reported metadata for a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseMetadata {
    #[serde(rename = "latency_ms", with = "crate::durations::millis")]
    pub latency: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,

    /// Model that actually answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Tool invocations requested by the model, in emitted order.
    /// `None` when the backend does not report tool calls at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Cost of the call in USD, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// A provider-neutral tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,

    /// Arguments as a JSON value; providers that send an argument string
    /// are parsed, falling back to the raw string
    #[serde(default)]
    pub args: JsonValue,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: JsonValue) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Build from an encoded argument string.
    pub fn from_encoded(name: impl Into<String>, arguments: &str) -> Self {
        let args = serde_json::from_str(arguments)
            .unwrap_or_else(|_| JsonValue::String(arguments.to_string()));
        Self::new(name, args)
    }
}

impl ResponseMetadata {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    /// Names of the reported tool calls, in emitted order.
    pub fn tool_names(&self) -> Option<Vec<&str>> {
        self.tool_calls
            .as_ref()
            .map(|calls| calls.iter().map(|c| c.name.as_str()).collect())
    }

    /// Total tokens, if the provider reported any.
    pub fn total_tokens(&self) -> Option<u64> {
        match (self.prompt_tokens, self.completion_tokens) {
            (None, None) => None,
            (p, c) => Some(u64::from(p.unwrap_or(0)) + u64::from(c.unwrap_or(0))),
        }
    }
}

/// A response obtained from one dispatch attempt. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    /// Raw response text
    pub text: String,

    /// Structured value, when one could be recovered from `text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonValue>,

    pub metadata: ResponseMetadata,
}

impl ModelResponse {
    /// Build a response, recovering a structured value from the text if possible.
    pub fn new(text: impl Into<String>, metadata: ResponseMetadata) -> Self {
        let text = text.into();
        let json = extract_json(&text);
        Self {
            text,
            json,
            metadata,
        }
    }

    /// Build a response whose structured value is already known.
    pub fn structured(value: JsonValue, metadata: ResponseMetadata) -> Self {
        Self {
            text: value.to_string(),
            json: Some(value),
            metadata,
        }
    }

    pub fn is_structured(&self) -> bool {
        self.json.is_some()
    }
}

/// Recover a JSON value from model output.
pub fn extract_json(text: &str) -> Option<JsonValue> {
    if let Ok(value) = serde_json::from_str::<JsonValue>(text.trim()) {
        return Some(value);
    }

    if let Some(caps) = JSON_FENCE.captures(text) {
        if let Some(value) = parse_candidate(caps.get(1).map(|m| m.as_str())) {
            return Some(value);
        }
    }

    if let Some(caps) = ANY_FENCE.captures(text) {
        let inner = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if looks_jsonish(inner) {
            if let Some(value) = parse_candidate(Some(inner)) {
                return Some(value);
            }
        }
    }

    parse_candidate(balanced_span(text))
}

fn parse_candidate(candidate: Option<&str>) -> Option<JsonValue> {
    let candidate = candidate?.trim();
    if candidate.is_empty() {
        return None;
    }
    serde_json::from_str(candidate).ok()
}

fn looks_jsonish(s: &str) -> bool {
    (s.starts_with('{') && s.ends_with('}')) || (s.starts_with('[') && s.ends_with(']'))
}

/// First balanced object or array span, skipping brackets inside strings.
fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
