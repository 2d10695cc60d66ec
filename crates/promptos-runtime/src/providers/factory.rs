//! Provider factory pattern for dynamic LLM provider registration.
//!
//! Providers register factories that create instances from configuration,
//! so the configured provider name selects a backend at runtime.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create("openai", &serde_json::json!({}))?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};

/// Factory for creating LLM providers from configuration.
///
/// Each factory is responsible for:
/// 1. Validating its configuration format
/// 2. Creating provider instances
/// 3. Naming the environment variable that holds its API key
pub trait ProviderFactory: Send + Sync {
    /// Unique identifier for this provider type.
    ///
    /// Examples: "openai", "anthropic"
    fn provider_type(&self) -> &'static str;

    /// Create a provider instance from JSON configuration.
    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate configuration without creating a provider.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        validate_base_url(config)
    }

    /// Environment variable holding the API key.
    fn credential_env(&self) -> &'static str;

    /// Human-readable credential name for messages.
    fn credential_name(&self) -> &'static str;

    /// Model used when none is configured.
    fn default_model(&self) -> &'static str;

    /// Cheap syntactic check on a user-supplied key.
    fn check_key_format(&self, key: &str) -> bool {
        !key.trim().is_empty()
    }
}

/// Reject a `base_url` that is not an HTTP(S) URL.
fn validate_base_url(config: &JsonValue) -> Result<(), ProviderError> {
    if let Some(url) = config["base_url"].as_str() {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}

/// Registry of available provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory.
    ///
    /// If a factory with the same type already exists, it will be replaced.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    /// Create a provider from type name and configuration.
    pub fn create(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.require(provider_type)?;
        factory.validate_config(config)?;
        factory.create(config)
    }

    /// List available provider types.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Get the factory for a provider type.
    pub fn get_factory(&self, provider_type: &str) -> Option<&Arc<dyn ProviderFactory>> {
        self.factories.get(provider_type)
    }

    fn require(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    /// Create a registry with all compiled-in providers registered.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiProviderFactory));
        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicProviderFactory));
        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, TokenUsage,
    };
    use async_trait::async_trait;
    use promptos_core::ModelReply;

    struct MockProvider {
        name: String,
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(
            &self,
            _credential: &ApiCredential,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                reply: ModelReply::Text("mock response".to_string()),
                usage: TokenUsage::default(),
                model: "mock".to_string(),
                stop_reason: Some("stop".to_string()),
            })
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct MockProviderFactory;

    impl ProviderFactory for MockProviderFactory {
        fn provider_type(&self) -> &'static str {
            "mock"
        }

        fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            let name = config["name"]
                .as_str()
                .unwrap_or("mock-provider")
                .to_string();
            Ok(Arc::new(MockProvider { name }))
        }

        fn credential_env(&self) -> &'static str {
            "MOCK_API_KEY"
        }

        fn credential_name(&self) -> &'static str {
            "Mock API key"
        }

        fn default_model(&self) -> &'static str {
            "mock-1"
        }
    }

    #[test]
    fn test_registry_register_and_create() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProviderFactory));

        assert!(registry.get_factory("mock").is_some());
        assert!(registry.get_factory("unknown").is_none());

        let config = serde_json::json!({"name": "test-mock"});
        let provider = registry.create("mock", &config).unwrap();
        assert_eq!(provider.name(), "test-mock");
    }

    #[test]
    fn test_registry_unknown_provider() {
        let registry = ProviderRegistry::new();

        match registry.create("unknown", &serde_json::json!({})) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("Unknown provider type"));
            }
            _ => panic!("Expected NotConfigured error"),
        }
    }

    #[test]
    fn test_registry_available_types() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.available_types().is_empty());

        registry.register(Arc::new(MockProviderFactory));
        assert_eq!(registry.available_types(), vec!["mock"]);
    }

    #[test]
    fn test_registry_validates_before_create() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProviderFactory));

        let config = serde_json::json!({"base_url": "ftp://example.com"});
        assert!(matches!(
            registry.create("mock", &config),
            Err(ProviderError::NotConfigured(_))
        ));
        let config = serde_json::json!({"base_url": "http://localhost:8080"});
        assert!(registry.create("mock", &config).is_ok());
    }

    #[test]
    fn test_default_key_format_check() {
        let factory = MockProviderFactory;
        assert!(factory.check_key_format("anything"));
        assert!(!factory.check_key_format("  "));
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_with_defaults_includes_openai() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.get_factory("openai").is_some());
    }

    #[cfg(feature = "anthropic")]
    #[test]
    fn test_with_defaults_includes_anthropic() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.get_factory("anthropic").is_some());
    }
}
