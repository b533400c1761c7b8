//! Raw-text assertions. These work whether or not the body is structured.

use regex::Regex;

use crate::types::{AssertionResult, TextMode};

const KIND: &str = "text";
const PREVIEW_CHARS: usize = 120;

pub fn evaluate(id: &str, mode: TextMode, value: &str, text: &str) -> AssertionResult {
    let outcome = match mode {
        TextMode::Contains => text.contains(value),
        TextMode::ContainsIgnoreCase => text.to_lowercase().contains(&value.to_lowercase()),
        TextMode::NotContains => !text.contains(value),
        TextMode::Regex => match Regex::new(value) {
            Ok(re) => re.is_match(text),
            Err(e) => {
                return AssertionResult::fail(id, KIND, format!("invalid pattern /{}/: {}", value, e))
            }
        },
    };

    let expectation = match mode {
        TextMode::Contains => format!("contain {:?}", value),
        TextMode::ContainsIgnoreCase => format!("contain {:?} (ignoring case)", value),
        TextMode::NotContains => format!("not contain {:?}", value),
        TextMode::Regex => format!("match /{}/", value),
    };

    if outcome {
        AssertionResult::pass(id, KIND, format!("response text does {}", expectation))
    } else {
        AssertionResult::fail(
            id,
            KIND,
            format!("expected response text to {} but observed {:?}", expectation, preview(text)),
        )
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}
