//! Anthropic Messages API gateway.

use async_trait::async_trait;
use promptcheck_core::{DispatchError, ModelResponse, ResponseMetadata, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use super::{
    http,
    pricing::{cost_of, Pricing},
    secrets::{ApiCredential, CredentialSource, CredentialSpec},
    ExecutionRequest, ProviderError, ProviderFactory, ProviderGateway,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_MAX_TOKENS: u64 = 1024;
const API_VERSION: &str = "2023-06-01";

pub const ANTHROPIC_KEY: CredentialSpec = CredentialSpec {
    config_key: "api_key",
    default_env: "ANTHROPIC_API_KEY",
    name: "Anthropic API key",
};

pub struct AnthropicGateway {
    credential: ApiCredential,
    base_url: String,
    model: String,
    max_tokens: u64,
    pricing: Option<Pricing>,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicGateway")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicGateway {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, ANTHROPIC_KEY.name),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            pricing: None,
            client: http::build_client()?,
        })
    }

    /// Build from gateway config: `api_key` / `api_key_env`, `base_url`,
    /// `model`, `max_tokens`, `pricing`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(config, &ANTHROPIC_KEY)?;

        Ok(Self {
            credential,
            base_url: config["base_url"]
                .as_str()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config["model"].as_str().unwrap_or(DEFAULT_MODEL).to_string(),
            max_tokens: config["max_tokens"].as_u64().unwrap_or(DEFAULT_MAX_TOKENS),
            pricing: Pricing::from_config(config)?,
            client: http::build_client()?,
        })
    }

    fn build_request(&self, request: &ExecutionRequest) -> MessagesRequest {
        MessagesRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            max_tokens: request.param_u64("max_tokens").unwrap_or(self.max_tokens),
            system: request.system.clone(),
            messages: vec![Message {
                role: "user",
                content: request.prompt.clone(),
            }],
            temperature: request.param_f64("temperature"),
            top_p: request.param_f64("top_p"),
            tools: request.params.get("tools").cloned(),
            tool_choice: request.params.get("tool_choice").cloned(),
        }
    }

    fn into_response(&self, body: MessagesResponse, latency: Duration) -> ModelResponse {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in body.content {
            match block {
                ContentBlock::Text { text: part } => text.push_str(&part),
                ContentBlock::ToolUse { name, input } => tool_calls.push(ToolCall::new(name, input)),
                ContentBlock::Other => {}
            }
        }

        let prompt_tokens = Some(body.usage.input_tokens);
        let completion_tokens = Some(body.usage.output_tokens);
        ModelResponse::new(
            text,
            ResponseMetadata {
                latency,
                prompt_tokens,
                completion_tokens,
                model: Some(body.model),
                stop_reason: body.stop_reason,
                tool_calls: Some(tool_calls),
                cost_usd: cost_of(self.pricing.as_ref(), prompt_tokens, completion_tokens),
            },
        )
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: JsonValue,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl ProviderGateway for AnthropicGateway {
    async fn dispatch(&self, request: &ExecutionRequest) -> Result<ModelResponse, DispatchError> {
        let started = tokio::time::Instant::now();

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .timeout(request.timeout)
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(http::map_send_error)?;

        let body: MessagesResponse = http::decode_response(response).await?;
        Ok(self.into_response(body, started.elapsed()))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for Anthropic gateways.
///
/// ```json
/// {
///   "type": "anthropic",
///   "api_key_env": "ANTHROPIC_API_KEY",
///   "model": "claude-sonnet-4-5",
///   "max_tokens": 1024
/// }
/// ```
pub struct AnthropicGatewayFactory;

impl ProviderFactory for AnthropicGatewayFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ProviderGateway>, ProviderError> {
        Ok(Arc::new(AnthropicGateway::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, &ANTHROPIC_KEY) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in config or {} env",
                ANTHROPIC_KEY.default_env
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            http::validate_base_url(url)?;
        }

        Pricing::from_config(config)?;
        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "model": DEFAULT_MODEL,
            "max_tokens": DEFAULT_MAX_TOKENS
        })
    }

    fn description(&self) -> &'static str {
        "Anthropic Messages API"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            case_id: "t1".to_string(),
            prompt: "Summarize".to_string(),
            system: Some("Be brief".to_string()),
            model: None,
            params: [("temperature".to_string(), json!(0.3))]
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_request_shape() {
        let gateway = AnthropicGateway::from_config(&json!({
            "api_key": "test-key",
            "model": "claude-haiku",
            "max_tokens": 64
        }))
        .unwrap();

        let body = serde_json::to_value(gateway.build_request(&request())).unwrap();
        assert_eq!(body["model"], "claude-haiku");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["temperature"], 0.3);
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn test_tool_use_blocks_become_tool_calls() {
        let gateway = AnthropicGateway::from_config(&json!({
            "api_key": "test-key",
            "pricing": { "input_per_mtok": 3.0, "output_per_mtok": 15.0 }
        }))
        .unwrap();
        let body: MessagesResponse = serde_json::from_value(json!({
            "model": "claude-sonnet-4-5",
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 1000, "output_tokens": 200 },
            "content": [
                { "type": "text", "text": "Let me look that up." },
                { "type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": { "city": "Paris" } },
                { "type": "thinking", "thinking": "..." }
            ]
        }))
        .unwrap();

        let response = gateway.into_response(body, Duration::from_millis(20));
        assert_eq!(response.text, "Let me look that up.");
        let calls = response.metadata.tool_calls.as_ref().unwrap();
        assert_eq!(calls, &vec![ToolCall::new("get_weather", json!({"city": "Paris"}))]);
        let cost = response.metadata.cost_usd.unwrap();
        assert!((cost - 0.006).abs() < 1e-12, "{}", cost);
    }

    #[test]
    fn test_tools_param_passed_through() {
        let gateway = AnthropicGateway::new("test-key").unwrap();
        let mut req = request();
        req.params.insert("tools".to_string(), json!([{ "name": "get_weather" }]));
        let body = serde_json::to_value(gateway.build_request(&req)).unwrap();
        assert_eq!(body["tools"][0]["name"], "get_weather");
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-ant-REDACTED";
        let gateway = AnthropicGateway::new(secret_key).unwrap();

        let debug_output = format!("{:?}", gateway);
        assert!(!debug_output.contains(secret_key));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_factory_validate_invalid_base_url() {
        let factory = AnthropicGatewayFactory;
        let config = json!({
            "api_key": "test-key",
            "base_url": "invalid-url"
        });
        assert!(factory.validate_config(&config).is_err());
    }

    #[test]
    fn test_from_config_trims_base_url() {
        let gateway = AnthropicGateway::from_config(&json!({
            "api_key": "config-api-key",
            "base_url": "https://proxy.internal/v1/"
        }))
        .unwrap();
        assert_eq!(gateway.base_url, "https://proxy.internal/v1");
        assert_eq!(gateway.credential.source(), CredentialSource::Config);
    }
}
