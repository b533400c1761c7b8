//! Fixture gateway: canned responses for offline runs and tests.
//!
//! ## Configuration Format
//! ```yaml
//! type: fixture
//! body: '{"status": "ok"}'   # string bodies go through JSON extraction
//! cases:                     # per-case overrides of `body`
//!   t2: { status: error }    # non-string bodies are already structured
//! echo: false                # reply with the resolved prompt instead
//! delay: 150ms               # simulated backend latency
//! prompt_tokens: 12
//! completion_tokens: 40
//! error: { kind: rate_limited, retry_after: 1000 }   # fail every dispatch
//! tool_calls:                # reported tool invocations
//!   - { name: search, args: { q: umbrella } }
//! cost_usd: 0.002            # or `pricing`, applied to the token counts
//! ```

use async_trait::async_trait;
use promptcheck_core::{DispatchError, ModelResponse, ResponseMetadata, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::pricing::{cost_of, Pricing};
use super::{ExecutionRequest, ProviderError, ProviderFactory, ProviderGateway};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Body returned for any case without an override
    pub body: Option<JsonValue>,

    /// Case id to body
    pub cases: BTreeMap<String, JsonValue>,

    /// Reply with the resolved prompt text
    pub echo: bool,

    /// Failure returned by every dispatch
    pub error: Option<DispatchError>,

    #[serde(with = "promptcheck_core::durations::human_option")]
    pub delay: Option<Duration>,

    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,

    /// Reported model name
    pub model: Option<String>,

    pub tool_calls: Option<Vec<ToolCall>>,

    /// Reported cost; takes precedence over `pricing`
    pub cost_usd: Option<f64>,

    pub pricing: Option<Pricing>,
}

/// Serves [`FixtureConfig`] responses.
#[derive(Debug, Clone)]
pub struct FixtureGateway {
    config: FixtureConfig,
}

impl FixtureGateway {
    pub fn new(config: FixtureConfig) -> Self {
        Self { config }
    }

    /// Gateway that returns `body` for every case.
    pub fn with_body(body: impl Into<String>) -> Self {
        Self::new(FixtureConfig {
            body: Some(JsonValue::String(body.into())),
            ..Default::default()
        })
    }

    /// Gateway that fails every dispatch with `error`.
    pub fn failing(error: DispatchError) -> Self {
        Self::new(FixtureConfig {
            error: Some(error),
            ..Default::default()
        })
    }

    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let config: FixtureConfig = serde_json::from_value(config.clone())
            .map_err(|e| ProviderError::InvalidConfig(format!("fixture: {}", e)))?;
        Ok(Self::new(config))
    }

    fn body_for(&self, request: &ExecutionRequest) -> Option<JsonValue> {
        if self.config.echo {
            return Some(JsonValue::String(request.prompt.clone()));
        }
        self.config
            .cases
            .get(&request.case_id)
            .or(self.config.body.as_ref())
            .cloned()
    }
}

#[async_trait]
impl ProviderGateway for FixtureGateway {
    async fn dispatch(&self, request: &ExecutionRequest) -> Result<ModelResponse, DispatchError> {
        let started = tokio::time::Instant::now();

        if let Some(delay) = self.config.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = &self.config.error {
            return Err(error.clone());
        }

        let body = self.body_for(request).ok_or_else(|| {
            DispatchError::malformed(format!("fixture has no body for case '{}'", request.case_id))
        })?;

        let c = &self.config;
        let metadata = ResponseMetadata {
            latency: started.elapsed(),
            prompt_tokens: c.prompt_tokens,
            completion_tokens: c.completion_tokens,
            model: c.model.clone().or_else(|| request.model.clone()),
            stop_reason: Some(
                if c.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty()) {
                    "tool_use"
                } else {
                    "end_turn"
                }
                .to_string(),
            ),
            tool_calls: c.tool_calls.clone(),
            cost_usd: c.cost_usd.or_else(|| {
                cost_of(c.pricing.as_ref(), c.prompt_tokens, c.completion_tokens)
            }),
        };

        Ok(match body {
            JsonValue::String(text) => ModelResponse::new(text, metadata),
            value => ModelResponse::structured(value, metadata),
        })
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

/// Factory for fixture gateways. Always registered.
pub struct FixtureGatewayFactory;

impl ProviderFactory for FixtureGatewayFactory {
    fn provider_type(&self) -> &'static str {
        "fixture"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ProviderGateway>, ProviderError> {
        Ok(Arc::new(FixtureGateway::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        Pricing::from_config(config)?;
        let gateway = FixtureGateway::from_config(config)?;
        let c = &gateway.config;
        if c.body.is_none() && c.cases.is_empty() && !c.echo && c.error.is_none() {
            return Err(ProviderError::InvalidConfig(
                "fixture needs one of 'body', 'cases', 'echo' or 'error'".to_string(),
            ));
        }
        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "echo": true })
    }

    fn description(&self) -> &'static str {
        "Canned responses for offline runs"
    }
}
