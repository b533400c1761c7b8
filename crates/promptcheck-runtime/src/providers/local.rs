//! Local inference gateway (Ollama `/api/chat` protocol).
//!
//! No credential is required; an optional bearer token is sent when one is
//! configured, for servers behind an authenticating proxy.

use async_trait::async_trait;
use promptcheck_core::{DispatchError, ModelResponse, ResponseMetadata, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

use super::{
    http,
    pricing::{cost_of, Pricing},
    secrets::{ApiCredential, CredentialSpec},
    ExecutionRequest, ProviderError, ProviderFactory, ProviderGateway,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub const LOCAL_TOKEN: CredentialSpec = CredentialSpec {
    config_key: "token",
    default_env: "PROMPTCHECK_LOCAL_TOKEN",
    name: "local inference token",
};

#[derive(Debug)]
pub struct LocalGateway {
    token: Option<ApiCredential>,
    base_url: String,
    model: String,
    pricing: Option<Pricing>,
    client: reqwest::Client,
}

impl LocalGateway {
    /// Build from gateway config: `model` (required), `base_url`, `token`,
    /// `pricing`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let model = config["model"]
            .as_str()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ProviderError::InvalidConfig("local provider needs 'model'".to_string()))?;

        Ok(Self {
            token: ApiCredential::resolve_optional(config, &LOCAL_TOKEN),
            base_url: config["base_url"]
                .as_str()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            pricing: Pricing::from_config(config)?,
            client: http::build_client()?,
        })
    }

    fn build_request(&self, request: &ExecutionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
                tool_calls: None,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
            tool_calls: None,
        });

        // Ollama takes sampling parameters under `options`; tools are top level.
        let options: Map<String, JsonValue> = request
            .params
            .iter()
            .filter(|(k, _)| k.as_str() != "tools")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        ChatRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            stream: false,
            options: (!options.is_empty()).then_some(JsonValue::Object(options)),
            tools: request.params.get("tools").cloned(),
        }
    }

    fn into_response(&self, body: ChatResponse, latency: std::time::Duration) -> ModelResponse {
        let tool_calls = body
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall::new(call.function.name, call.function.arguments))
            .collect();

        ModelResponse::new(
            body.message.content,
            ResponseMetadata {
                latency,
                prompt_tokens: body.prompt_eval_count,
                completion_tokens: body.eval_count,
                model: Some(body.model),
                stop_reason: body.done_reason,
                tool_calls: Some(tool_calls),
                cost_usd: cost_of(self.pricing.as_ref(), body.prompt_eval_count, body.eval_count),
            },
        )
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

/// Ollama sends `arguments` as an object, not an encoded string.
#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: JsonValue,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    message: ChatMessage,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[async_trait]
impl ProviderGateway for LocalGateway {
    async fn dispatch(&self, request: &ExecutionRequest) -> Result<ModelResponse, DispatchError> {
        let started = tokio::time::Instant::now();

        let mut builder = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(request.timeout)
            .json(&self.build_request(request));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose());
        }

        let response = builder.send().await.map_err(http::map_send_error)?;
        let body: ChatResponse = http::decode_response(response).await?;
        Ok(self.into_response(body, started.elapsed()))
    }

    fn name(&self) -> &str {
        "local"
    }
}

pub struct LocalGatewayFactory;

impl ProviderFactory for LocalGatewayFactory {
    fn provider_type(&self) -> &'static str {
        "local"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ProviderGateway>, ProviderError> {
        Ok(Arc::new(LocalGateway::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if config["model"].as_str().map_or(true, str::is_empty) {
            return Err(ProviderError::InvalidConfig(
                "local provider needs 'model'".to_string(),
            ));
        }
        if let Some(url) = config["base_url"].as_str() {
            http::validate_base_url(url)?;
        }
        Pricing::from_config(config)?;
        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "base_url": DEFAULT_BASE_URL })
    }

    fn description(&self) -> &'static str {
        "Local inference server (Ollama protocol)"
    }
}
