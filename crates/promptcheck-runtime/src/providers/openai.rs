//! OpenAI-compatible chat completions gateway.
//!
//! Works against any endpoint speaking the `/v1/chat/completions` protocol.

use async_trait::async_trait;
use promptcheck_core::{DispatchError, ModelResponse, ResponseMetadata, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use super::{
    http,
    pricing::{cost_of, Pricing},
    secrets::{ApiCredential, CredentialSpec},
    ExecutionRequest, ProviderError, ProviderFactory, ProviderGateway,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub const OPENAI_KEY: CredentialSpec = CredentialSpec {
    config_key: "api_key",
    default_env: "OPENAI_API_KEY",
    name: "OpenAI API key",
};

pub struct OpenAiGateway {
    credential: ApiCredential,
    base_url: String,
    model: String,
    json_mode: bool,
    pricing: Option<Pricing>,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGateway")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiGateway {
    /// Build from gateway config: `api_key` / `api_key_env`, `base_url`,
    /// `model`, `json_mode` (request a JSON object response), `pricing`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::resolve(config, &OPENAI_KEY)?,
            base_url: config["base_url"]
                .as_str()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config["model"].as_str().unwrap_or(DEFAULT_MODEL).to_string(),
            json_mode: config["json_mode"].as_bool().unwrap_or(false),
            pricing: Pricing::from_config(config)?,
            client: http::build_client()?,
        })
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request(&self, request: &ExecutionRequest) -> JsonValue {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        let mut body = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
        });

        // Pass-through parameters use the wire names directly.
        for (key, value) in &request.params {
            body[key.as_str()] = value.clone();
        }

        if self.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        body
    }

    fn into_response(
        &self,
        body: ChatResponse,
        latency: Duration,
    ) -> Result<ModelResponse, DispatchError> {
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::malformed("No choices in response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall::from_encoded(call.function.name, &call.function.arguments))
            .collect();

        let prompt_tokens = body.usage.as_ref().map(|u| u.prompt_tokens);
        let completion_tokens = body.usage.as_ref().map(|u| u.completion_tokens);
        Ok(ModelResponse::new(
            choice.message.content.unwrap_or_default(),
            ResponseMetadata {
                latency,
                prompt_tokens,
                completion_tokens,
                model: Some(body.model),
                stop_reason: choice.finish_reason,
                tool_calls: Some(tool_calls),
                cost_usd: cost_of(self.pricing.as_ref(), prompt_tokens, completion_tokens),
            },
        ))
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

/// `arguments` is a JSON document encoded as a string.
#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl ProviderGateway for OpenAiGateway {
    async fn dispatch(&self, request: &ExecutionRequest) -> Result<ModelResponse, DispatchError> {
        let started = tokio::time::Instant::now();

        let response = self
            .client
            .post(self.chat_completions_url())
            .bearer_auth(self.credential.expose())
            .timeout(request.timeout)
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(http::map_send_error)?;

        let body: ChatResponse = http::decode_response(response).await?;
        self.into_response(body, started.elapsed())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

pub struct OpenAiGatewayFactory;

impl ProviderFactory for OpenAiGatewayFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn ProviderGateway>, ProviderError> {
        Ok(Arc::new(OpenAiGateway::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, &OPENAI_KEY) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in config or {} env",
                OPENAI_KEY.default_env
            )));
        }
        if let Some(url) = config["base_url"].as_str() {
            http::validate_base_url(url)?;
        }
        Pricing::from_config(config)?;
        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "model": DEFAULT_MODEL, "json_mode": false })
    }

    fn description(&self) -> &'static str {
        "OpenAI-compatible chat completions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_request_shape() {
        let gateway = OpenAiGateway::from_config(&json!({
            "api_key": "test-key",
            "base_url": "http://localhost:8080/",
            "json_mode": true
        }))
        .unwrap();

        let request = ExecutionRequest {
            case_id: "t1".to_string(),
            prompt: "List colors".to_string(),
            system: Some("Answer in JSON".to_string()),
            model: Some("gpt-4o".to_string()),
            params: [("temperature".to_string(), json!(0))]
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
            timeout: Duration::from_secs(5),
        };

        assert_eq!(
            gateway.chat_completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );

        let body = gateway.build_request(&request);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "List colors");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_tool_calls_decoded_from_argument_strings() {
        let gateway = OpenAiGateway::from_config(&json!({"api_key": "test-key"})).unwrap();
        let body: ChatResponse = serde_json::from_value(json!({
            "model": "gpt-4o-mini",
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 },
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [
                        { "id": "c1", "type": "function",
                          "function": { "name": "search", "arguments": "{\"q\": \"umbrella\"}" } },
                        { "id": "c2", "type": "function",
                          "function": { "name": "noop", "arguments": "not json" } }
                    ]
                }
            }]
        }))
        .unwrap();

        let response = gateway.into_response(body, Duration::from_millis(5)).unwrap();
        assert_eq!(response.text, "");
        let calls = response.metadata.tool_calls.unwrap();
        assert_eq!(calls[0], ToolCall::new("search", json!({"q": "umbrella"})));
        assert_eq!(calls[1].args, json!("not json"));
        assert_eq!(response.metadata.cost_usd, None);
    }

    #[test]
    fn test_empty_choices_is_malformed() {
        let gateway = OpenAiGateway::from_config(&json!({"api_key": "test-key"})).unwrap();
        let body: ChatResponse =
            serde_json::from_value(json!({"model": "m", "choices": []})).unwrap();
        assert!(matches!(
            gateway.into_response(body, Duration::ZERO),
            Err(DispatchError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_factory_requires_key() {
        let factory = OpenAiGatewayFactory;
        let config = json!({ "api_key_env": "PROMPTCHECK_TEST_OPENAI_UNSET" });
        assert!(matches!(
            factory.validate_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }
}
