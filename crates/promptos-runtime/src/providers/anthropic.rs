//! Anthropic Messages API provider.
//!
//! Tool use is forced with `tool_choice`, and the `tool_use` block's input
//! becomes the grading arguments.
//!
//! ## Security
//!
//! The API key arrives as an [`ApiCredential`] on each call and is exposed
//! only when the request header is set.

use super::{
    factory::ProviderFactory,
    secrets::ApiCredential,
    send_error, status_error, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage,
};
use async_trait::async_trait;
use promptos_core::ModelReply;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

/// Environment variable name for Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider for the public Anthropic endpoint.
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Create from JSON configuration.
    ///
    /// Recognized keys: `base_url`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let provider = Self::new()?;
        Ok(match config["base_url"].as_str() {
            Some(url) => provider.with_base_url(url),
            None => provider,
        })
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Anthropic API request format.
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a JsonValue,
}

/// Anthropic API response format.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockResponse {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: JsonValue,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Prefer the first tool call; otherwise join the text blocks.
fn reply_from_blocks(blocks: Vec<ContentBlockResponse>) -> ModelReply {
    let mut text = String::new();
    for block in blocks {
        match block {
            ContentBlockResponse::ToolUse { name, input } => {
                return ModelReply::ToolCall {
                    name,
                    arguments: input.to_string(),
                };
            }
            ContentBlockResponse::Text { text: t } => text.push_str(&t),
            ContentBlockResponse::Other => {}
        }
    }
    ModelReply::Text(text)
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        credential: &ApiCredential,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let api_messages: Vec<AnthropicMessage> = messages
            .into_iter()
            .map(|msg| AnthropicMessage {
                role: msg.role,
                content: vec![ContentBlock::Text { text: msg.content }],
            })
            .collect();

        let request = AnthropicRequest {
            model: &config.model,
            max_tokens: config.max_tokens,
            messages: api_messages,
            temperature: config.temperature,
            tools: config
                .tool
                .iter()
                .map(|tool| AnthropicTool {
                    name: &tool.name,
                    description: &tool.description,
                    input_schema: &tool.parameters,
                })
                .collect(),
            tool_choice: config
                .tool
                .as_ref()
                .map(|tool| json!({ "type": "tool", "name": tool.name })),
        };

        debug!(model = %config.model, base_url = %self.base_url, "Sending messages request");

        // Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", credential.expose())
            .header("anthropic-version", API_VERSION)
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, config.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(CompletionResponse {
            reply: reply_from_blocks(body.content),
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for creating Anthropic providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "base_url": "https://..."   // Optional, custom API endpoint
/// }
/// ```
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_config(config)?))
    }

    fn credential_env(&self) -> &'static str {
        ANTHROPIC_API_KEY_ENV
    }

    fn credential_name(&self) -> &'static str {
        "Anthropic API key"
    }

    fn default_model(&self) -> &'static str {
        "claude-sonnet-4-5"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CredentialSource, ToolDefinition};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential() -> ApiCredential {
        ApiCredential::new(
            "sk-ant-test",
            CredentialSource::Programmatic,
            "Anthropic API key",
        )
    }

    fn grading_config() -> CompletionConfig {
        CompletionConfig {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 512,
            temperature: 0.0,
            timeout: Duration::from_secs(5),
            tool: Some(ToolDefinition::grading().unwrap()),
        }
    }

    #[tokio::test]
    async fn test_tool_use_block_becomes_tool_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({
                "tool_choice": { "type": "tool", "name": "GradingResult" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "claude-sonnet-4-5",
                "stop_reason": "tool_use",
                "content": [
                    { "type": "text", "text": "Grading now." },
                    { "type": "tool_use", "id": "toolu_1", "name": "GradingResult",
                      "input": { "ambiguity_score": 4 } }
                ],
                "usage": { "input_tokens": 300, "output_tokens": 90 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new().unwrap().with_base_url(server.uri());
        let response = provider
            .complete(&credential(), vec![ChatMessage::user("grade me")], &grading_config())
            .await
            .unwrap();

        match response.reply {
            ModelReply::ToolCall { name, arguments } => {
                assert_eq!(name, "GradingResult");
                let args: JsonValue = serde_json::from_str(&arguments).unwrap();
                assert_eq!(args["ambiguity_score"], 4);
            }
            other => panic!("expected tool call, got {:?}", other),
        }
        assert_eq!(response.usage.total(), 390);
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
    }

    #[tokio::test]
    async fn test_overloaded_is_transient_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": { "type": "overloaded_error", "message": "Overloaded" }
            })))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new().unwrap().with_base_url(server.uri());
        let err = provider
            .complete(&credential(), vec![ChatMessage::user("x")], &grading_config())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProviderError::ApiError {
                status: 529,
                message: "Overloaded".to_string()
            }
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_text_blocks_joined_without_tool_use() {
        let reply = reply_from_blocks(vec![
            ContentBlockResponse::Text {
                text: "no ".to_string(),
            },
            ContentBlockResponse::Other,
            ContentBlockResponse::Text {
                text: "thanks".to_string(),
            },
        ]);
        assert_eq!(reply, ModelReply::Text("no thanks".to_string()));
    }

    #[test]
    fn test_unknown_block_types_tolerated() {
        let body: AnthropicResponse = serde_json::from_value(json!({
            "model": "m",
            "stop_reason": null,
            "content": [{ "type": "thinking", "thinking": "..." }, { "type": "text", "text": "hi" }],
            "usage": { "input_tokens": 1, "output_tokens": 1 }
        }))
        .unwrap();
        assert_eq!(reply_from_blocks(body.content), ModelReply::Text("hi".to_string()));
    }

    #[test]
    fn test_factory_metadata() {
        let factory = AnthropicProviderFactory;
        assert_eq!(factory.provider_type(), "anthropic");
        assert_eq!(factory.credential_env(), ANTHROPIC_API_KEY_ENV);
        assert_eq!(factory.default_model(), "claude-sonnet-4-5");
        assert!(factory.validate_config(&json!({ "base_url": "invalid-url" })).is_err());
    }
}
