//! OpenAI chat completions provider.
//!
//! Grading requests force a function call, so the structured grading comes
//! back as tool-call arguments rather than free text.

use super::{
    factory::ProviderFactory,
    secrets::ApiCredential,
    send_error, status_error, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use promptos_core::ModelReply;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

/// Environment variable name for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat completions provider.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a provider for the public OpenAI endpoint.
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

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    function: FunctionSpec<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a JsonValue,
}

impl<'a> FunctionTool<'a> {
    fn from_definition(tool: &'a ToolDefinition) -> Self {
        Self {
            type_: "function",
            function: FunctionSpec {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl ResponseMessage {
    fn into_reply(self) -> ModelReply {
        if let Some(call) = self.tool_calls.and_then(|calls| calls.into_iter().next()) {
            return ModelReply::ToolCall {
                name: call.function.name,
                arguments: call.function.arguments,
            };
        }
        ModelReply::Text(self.content.or(self.refusal).unwrap_or_default())
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        credential: &ApiCredential,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            temperature: config.temperature,
            max_completion_tokens: config.max_tokens,
            tools: config
                .tool
                .iter()
                .map(FunctionTool::from_definition)
                .collect(),
            tool_choice: config.tool.as_ref().map(|tool| {
                json!({ "type": "function", "function": { "name": tool.name } })
            }),
        };

        debug!(model = %config.model, base_url = %self.base_url, "Sending chat completion");

        // Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, config.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response contained no choices".into()))?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            reply: choice.message.into_reply(),
            usage,
            model: body.model,
            stop_reason: choice.finish_reason,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for creating OpenAI providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "base_url": "https://..."   // Optional, custom API endpoint
/// }
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_config(config)?))
    }

    fn credential_env(&self) -> &'static str {
        OPENAI_API_KEY_ENV
    }

    fn credential_name(&self) -> &'static str {
        "OpenAI API key"
    }

    fn default_model(&self) -> &'static str {
        "gpt-4o"
    }

    fn check_key_format(&self, key: &str) -> bool {
        key.trim().starts_with("sk-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CredentialSource;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential() -> ApiCredential {
        ApiCredential::new("sk-test-key", CredentialSource::Programmatic, "OpenAI API key")
    }

    fn grading_config() -> CompletionConfig {
        CompletionConfig {
            model: "gpt-4o".to_string(),
            max_tokens: 512,
            temperature: 0.0,
            timeout: Duration::from_secs(5),
            tool: Some(ToolDefinition::grading().unwrap()),
        }
    }

    fn provider(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new().unwrap().with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_tool_call_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "temperature": 0.0,
                "tool_choice": { "type": "function", "function": { "name": "GradingResult" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-2024-08-06",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "GradingResult", "arguments": "{\"ambiguity_score\": 3}" }
                        }]
                    },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server)
            .complete(&credential(), vec![ChatMessage::user("grade me")], &grading_config())
            .await
            .unwrap();

        assert_eq!(
            response.reply,
            ModelReply::ToolCall {
                name: "GradingResult".to_string(),
                arguments: "{\"ambiguity_score\": 3}".to_string(),
            }
        );
        assert_eq!(response.usage.total(), 200);
        assert_eq!(response.model, "gpt-4o-2024-08-06");
    }

    #[tokio::test]
    async fn test_text_reply_when_no_tool_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o",
                "choices": [{
                    "message": { "role": "assistant", "content": "I can't grade that." },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let response = provider(&server)
            .complete(&credential(), vec![ChatMessage::user("grade me")], &grading_config())
            .await
            .unwrap();

        assert_eq!(response.reply, ModelReply::Text("I can't grade that.".to_string()));
        assert_eq!(response.usage, TokenUsage::default());
    }

    #[tokio::test]
    async fn test_refusal_becomes_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "refusal": "I'm sorry, I can't help with that."
                    },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let response = provider(&server)
            .complete(&credential(), vec![ChatMessage::user("grade me")], &grading_config())
            .await
            .unwrap();

        assert_eq!(
            response.reply,
            ModelReply::Text("I'm sorry, I can't help with that.".to_string())
        );
        // A refusal carries no grading, so validation reports it as declined
        assert!(matches!(
            promptos_core::parse_reply(&response.reply),
            Err(promptos_core::MalformedResponse::NoStructuredOutput)
        ));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided" }
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&credential(), vec![ChatMessage::user("x")], &grading_config())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::AuthError);
    }

    #[tokio::test]
    async fn test_rate_limit_and_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "message": "The server had an error" }
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let first = provider
            .complete(&credential(), vec![ChatMessage::user("x")], &grading_config())
            .await
            .unwrap_err();
        assert_eq!(
            first,
            ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );

        let second = provider
            .complete(&credential(), vec![ChatMessage::user("x")], &grading_config())
            .await
            .unwrap_err();
        assert_eq!(
            second,
            ProviderError::ApiError {
                status: 500,
                message: "The server had an error".to_string()
            }
        );
        assert!(second.is_transient());
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "model": "gpt-4o", "choices": [] })),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&credential(), vec![ChatMessage::user("x")], &grading_config())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[test]
    fn test_factory_key_format() {
        let factory = OpenAiProviderFactory;
        assert!(factory.check_key_format("sk-proj-abc"));
        assert!(!factory.check_key_format("not-a-key"));
        assert_eq!(factory.credential_env(), "OPENAI_API_KEY");
        assert_eq!(factory.default_model(), "gpt-4o");
    }

    #[test]
    fn test_factory_rejects_invalid_base_url() {
        let factory = OpenAiProviderFactory;
        assert!(factory
            .validate_config(&json!({ "base_url": "localhost:8080" }))
            .is_err());
        assert!(factory
            .validate_config(&json!({ "base_url": "http://localhost:8080/v1" }))
            .is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = OpenAiProvider::from_config(&json!({ "base_url": "http://localhost:9/v1/" }))
            .unwrap();
        assert_eq!(provider.base_url, "http://localhost:9/v1");
        assert_eq!(provider.name(), "openai");
    }
}
