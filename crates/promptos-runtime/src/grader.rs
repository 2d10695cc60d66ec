//! The grading orchestrator.
//!
//! One call to [`PromptGrader::grade_prompt`] is one logical model
//! invocation: build the request, call the provider under a timeout with
//! bounded retries, validate the reply, aggregate the scores.
//!
//! Nothing is mutated between gradings. The credential and rubric source are
//! fixed at construction, so one grader can be shared across tasks.

use backon::Retryable;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use promptos_core::{
    parse_reply, GradingRequest, GradingResult, MalformedResponse, RubricTemplate, TemplateError,
    TemplateSource,
};

use crate::providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ToolDefinition,
};
use crate::resilience::RetryPolicy;

/// Sampling temperature for every grading call.
pub const GRADING_TEMPERATURE: f32 = 0.0;

/// Why a grading failed.
#[derive(Error, Debug)]
pub enum GradeError {
    /// User-fixable setup problem, such as a missing API key.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The rubric or grading schema could not be loaded.
    #[error("rubric template unavailable: {0}")]
    TemplateMissing(String),

    /// The model call failed, timed out, or was rejected upstream.
    #[error("model invocation failed: {0}")]
    ModelInvocation(ProviderError),

    /// The call succeeded but the reply is not a usable grading.
    #[error("malformed model response: {0}")]
    MalformedResponse(#[from] MalformedResponse),
}

impl GradeError {
    /// A short instruction for the user, when there is one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            GradeError::Configuration(_) => Some("set your API key environment variable"),
            GradeError::TemplateMissing(_) => Some("check the configured rubric template path"),
            GradeError::ModelInvocation(e) if e.is_transient() => Some("try again shortly"),
            GradeError::ModelInvocation(ProviderError::AuthError) => {
                Some("check that your API key is valid")
            }
            GradeError::ModelInvocation(_) | GradeError::MalformedResponse(_) => None,
        }
    }
}

impl From<ProviderError> for GradeError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::NotConfigured(msg) => GradeError::Configuration(msg),
            other => GradeError::ModelInvocation(other),
        }
    }
}

impl From<TemplateError> for GradeError {
    fn from(error: TemplateError) -> Self {
        GradeError::TemplateMissing(error.to_string())
    }
}

/// Per-call settings for the grader.
#[derive(Debug, Clone, PartialEq)]
pub struct GraderConfig {
    /// Completion token limit
    pub max_tokens: u32,

    /// Timeout for each attempt
    pub timeout: Duration,

    pub retry: RetryPolicy,

    /// Where the rubric is loaded from on each grading
    pub template: TemplateSource,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            template: TemplateSource::Builtin,
        }
    }
}

/// Grades prompts with one provider and one credential.
#[derive(Clone)]
pub struct PromptGrader {
    provider: Arc<dyn LlmProvider>,
    credential: Option<Arc<ApiCredential>>,
    config: GraderConfig,
}

impl std::fmt::Debug for PromptGrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptGrader")
            .field("provider", &self.provider.name())
            .field("credential", &self.credential)
            .field("config", &self.config)
            .finish()
    }
}

impl PromptGrader {
    /// Create a grader. A missing credential is reported on each grading.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        credential: Option<ApiCredential>,
        config: GraderConfig,
    ) -> Self {
        Self {
            provider,
            credential: credential.map(Arc::new),
            config,
        }
    }

    /// The same grader with a different credential.
    pub fn with_credential(&self, credential: ApiCredential) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            credential: Some(Arc::new(credential)),
            config: self.config.clone(),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.credential.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Grade `prompt` with `model`.
    ///
    /// The credential is checked before anything else, so a grader without
    /// one never reaches the provider.
    pub async fn grade_prompt(&self, prompt: &str, model: &str) -> Result<GradingResult, GradeError> {
        let credential = self
            .credential
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                GradeError::Configuration(format!(
                    "no API key available for provider '{}'",
                    self.provider.name()
                ))
            })?;

        let rubric = RubricTemplate::load(&self.config.template)?;
        let request = GradingRequest::new(prompt, model, rubric);
        let message = request.message();

        let tool = ToolDefinition::grading()
            .map_err(|e| GradeError::TemplateMissing(e.to_string()))?;
        let completion = CompletionConfig {
            model: request.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: GRADING_TEMPERATURE,
            timeout: self.config.timeout,
            tool: Some(tool),
        };

        debug!(
            provider = self.provider.name(),
            model = %completion.model,
            prompt_chars = prompt.chars().count(),
            estimated_tokens = self.provider.estimate_tokens(&message),
            "Built grading request"
        );

        let messages = vec![ChatMessage::user(message)];
        let response = self.invoke(credential, &messages, &completion).await?;

        let payload = parse_reply(&response.reply).inspect_err(|e| {
            debug!(error = %e, stop_reason = ?response.stop_reason, "Reply failed validation");
        })?;
        let result = GradingResult::from_payload(prompt, payload);

        info!(
            provider = self.provider.name(),
            model = %response.model,
            overall_score = result.overall_score.get(),
            total_tokens = response.usage.total(),
            "Prompt graded"
        );

        Ok(result)
    }

    /// Call the provider with retries on transient failures.
    ///
    /// A rate-limited reply that names a `Retry-After` wait delays the next
    /// attempt by at least that long.
    async fn invoke(
        &self,
        credential: &ApiCredential,
        messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let attempt = || self.attempt(credential, messages, config);
        let policy = &self.config.retry;

        attempt
            .retry(policy.backoff())
            .sleep(tokio::time::sleep)
            .when(ProviderError::is_transient)
            .adjust(|error: &ProviderError, backoff: Option<Duration>| {
                policy.next_delay(backoff, error.retry_after())
            })
            .notify(|error: &ProviderError, delay: Duration| {
                warn!(
                    provider = self.provider.name(),
                    error = %error,
                    delay = ?delay,
                    "Model call failed, retrying"
                );
            })
            .await
    }

    /// One time-boxed provider call.
    async fn attempt(
        &self,
        credential: &ApiCredential,
        messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let call = self.provider.complete(credential, messages.to_vec(), config);
        match tokio::time::timeout(config.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(config.timeout)),
        }
    }
}
