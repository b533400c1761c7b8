//! # promptcheck-core
//!
//! Deterministic data model and assertion evaluation for prompt verification.
//!
//! This crate answers one question for every test case: given the response a
//! model backend produced, do the declared assertions hold?
//!
//! ## Key Guarantees
//!
//! 1. **Pure evaluation**: assertions never mutate the response or themselves
//! 2. **No I/O**: dispatching to model backends lives in `promptcheck-runtime`
//! 3. **Diagnosable**: every failed assertion says what was expected and observed
//! 4. **Consistent counts**: suite totals are derived from the verdict list in one fold
//!
//! ## Example
//!
//! ```rust,ignore
//! use promptcheck_core::{evaluate_all, Assertion, Comparison, ModelResponse, ResponseMetadata};
//!
//! let response = ModelResponse::new(r#"{"status":"ok"}"#, ResponseMetadata::default());
//! let assertions = vec![Assertion::path("a1", "$.status", Comparison::Equals("ok".into()))];
//!
//! for result in evaluate_all(&assertions, &response) {
//!     println!("{}: {} ({})", result.assertion_id, result.passed, result.diagnostic);
//! }
//! ```

pub mod aggregator;
pub mod assertions;
pub mod dispatch;
pub mod durations;
pub mod response;
pub mod suite;
pub mod template;
pub mod types;

// Re-export main types at crate root
pub use aggregator::SuiteAggregator;
pub use assertions::{evaluate, evaluate_all};
pub use dispatch::DispatchError;
pub use response::{extract_json, ModelResponse, ResponseMetadata, ToolCall};
pub use suite::{Suite, SuiteError};
pub use template::{render, TemplateError};
pub use types::{
    Assertion, AssertionResult, Check, Comparison, FailureCause, GuardrailRule, Outcome,
    PathAssertion, SchemaAssertion, SuiteCounts, SuiteResult, TestCase, TextMode, ToolArgs,
    ToolCallAssertion, ToolCallOrder, Verdict,
};
