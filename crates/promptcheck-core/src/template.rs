//! Prompt template resolution.
//!
//! Placeholders take the form `{{name}}`. String variables are inserted
//! verbatim; any other JSON value is inserted as its JSON text.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use thiserror::Error;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unresolved template variables: {}", .0.join(", "))]
    Unresolved(Vec<String>),
}

/// Substitute every placeholder in `template` from `vars`.
///
/// All missing names are reported at once.
pub fn render(template: &str, vars: &BTreeMap<String, JsonValue>) -> Result<String, TemplateError> {
    let mut missing: Vec<String> = Vec::new();

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match vars.get(name) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(TemplateError::Unresolved(missing))
    }
}

/// Names referenced by a template, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
