//! Startup wiring shared by the `grade` and `serve` commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use promptos_runtime::{
    ApiCredential, GraderSettings, HistoryEntry, PromptGrader, PromptLog, ProviderFactory,
    ProviderRegistry,
};

/// A configured grader plus what the surfaces need to describe it.
pub struct App {
    pub grader: PromptGrader,
    pub factory: Arc<dyn ProviderFactory>,
    pub model: String,
    pub history: Option<PromptLog>,
}

impl App {
    /// Build the provider and read the credential from the environment once.
    pub fn from_settings(settings: GraderSettings) -> Result<Self> {
        let registry = ProviderRegistry::with_defaults();

        let factory = registry
            .get_factory(&settings.provider)
            .cloned()
            .with_context(|| {
                format!(
                    "Unknown provider '{}' (available: {})",
                    settings.provider,
                    registry.available_types().join(", ")
                )
            })?;

        let provider = registry
            .create(&settings.provider, &settings.provider_config())
            .with_context(|| format!("Failed to create provider '{}'", settings.provider))?;

        let credential = ApiCredential::from_env(factory.credential_env(), factory.credential_name());
        debug!(
            provider = %settings.provider,
            credential = ?credential,
            "Loaded provider"
        );

        let model = settings.model_or(factory.default_model()).to_string();
        let grader = PromptGrader::new(provider, credential, settings.grader_config());

        Ok(Self {
            grader,
            factory,
            model,
            history: history_log(&settings),
        })
    }

    /// Append to the history log if one is configured.
    ///
    /// The grading already succeeded, so a write failure is reported but
    /// does not fail the command.
    pub fn record(&self, entry: HistoryEntry) {
        if let Some(log) = &self.history {
            if let Err(e) = log.append(&entry) {
                warn!(error = %e, "Failed to record history entry");
            }
        }
    }
}

pub fn history_log(settings: &GraderSettings) -> Option<PromptLog> {
    settings.history_file.as_ref().map(PromptLog::new)
}
