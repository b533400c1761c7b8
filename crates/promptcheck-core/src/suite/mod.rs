//! Suite document loading and validation.
//!
//! Suites are YAML or JSON documents validated against a JSON Schema and
//! then checked semantically (unique ids, compilable paths and patterns).

mod parser;
mod schema;

pub use parser::{Suite, SuiteError};
pub use schema::validate_suite_schema;
