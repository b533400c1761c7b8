//! Provider gateways: one dispatch contract over every model backend.
//!
//! A gateway turns an [`ExecutionRequest`] into a [`ModelResponse`] or a typed
//! [`DispatchError`]. Gateways never retry; that is the retry controller's job,
//! so backoff behaves the same for every backend.
//!
//! ## Security
//!
//! Network adapters hold credentials in [`ApiCredential`], which never prints
//! its value.

use async_trait::async_trait;
use promptcheck_core::{DispatchError, ModelResponse, TestCase};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod factory;
mod fixture;
pub mod http;
pub mod pricing;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "local")]
mod local;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use fixture::{FixtureConfig, FixtureGateway, FixtureGatewayFactory};
pub use pricing::Pricing;
pub use secrets::{ApiCredential, CredentialSource, CredentialSpec};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicGateway, AnthropicGatewayFactory};

#[cfg(feature = "openai")]
pub use openai::{OpenAiGateway, OpenAiGatewayFactory};

#[cfg(feature = "local")]
pub use local::{LocalGateway, LocalGatewayFactory};

/// Provider selector to resolved gateway, fixed for the duration of a run.
pub type GatewayMap = BTreeMap<String, Arc<dyn ProviderGateway>>;

/// Errors building gateways from configuration.
///
/// These happen before a run starts; failures during a run are
/// [`DispatchError`]s.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider '{selector}': {source}")]
    Selector {
        selector: String,
        #[source]
        source: Box<ProviderError>,
    },
}

/// Everything a gateway needs for one dispatch of one case.
///
/// Templates are already resolved.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub case_id: String,

    /// Resolved prompt text
    pub prompt: String,

    /// Resolved system prompt
    pub system: Option<String>,

    /// Model override; gateways fall back to their configured default
    pub model: Option<String>,

    /// Provider-specific parameters (temperature, max_tokens, ...)
    pub params: BTreeMap<String, JsonValue>,

    /// Per-attempt deadline, also handed to HTTP clients
    pub timeout: Duration,
}

impl ExecutionRequest {
    /// Build a request for `case` with already-rendered prompt texts.
    pub fn for_case(
        case: &TestCase,
        prompt: String,
        system: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            case_id: case.id.clone(),
            prompt,
            system,
            model: case.model.clone(),
            params: case.params.clone(),
            timeout,
        }
    }

    /// Numeric parameter, if present.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(JsonValue::as_f64)
    }

    /// Unsigned integer parameter, if present.
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(JsonValue::as_u64)
    }
}

/// A model backend behind the uniform dispatch contract.
///
/// Implementations must be safe for concurrent read-only use: the
/// orchestrator shares one instance across every worker.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Perform exactly one call to the backend.
    async fn dispatch(&self, request: &ExecutionRequest) -> Result<ModelResponse, DispatchError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
