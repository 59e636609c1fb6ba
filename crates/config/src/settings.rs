//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Top-level application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Orchestrator behavior.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Provider credentials.
    #[serde(default)]
    pub providers: ProviderKeys,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Load settings: `duplex.toml` (or the given path) if present, then
    /// `DUPLEX_*` environment variables, then provider credentials from
    /// their canonical environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "duplex.toml".to_string());

        let mut settings: Settings = Config::builder()
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::with_prefix("DUPLEX").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.providers.fill_from_env();
        settings.validate()?;
        tracing::debug!(source = %file, "settings loaded");
        Ok(settings)
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.prompt_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "orchestrator.prompt_queue_capacity".to_string(),
                message: "prompt queue capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Orchestrator behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Forward audio to STT even while recording is toggled off.
    #[serde(default = "default_true")]
    pub always_recording: bool,

    /// Capacity of the pending-prompt queue; enqueues beyond it fail fast.
    #[serde(default = "default_queue_capacity")]
    pub prompt_queue_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            always_recording: true,
            prompt_queue_capacity: 10,
        }
    }
}

/// API credentials for the provider collaborators. The core never reads
/// these; they are surfaced for provider wiring.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderKeys {
    pub deepgram_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl ProviderKeys {
    /// Fill unset keys from the canonical environment variables.
    pub fn fill_from_env(&mut self) {
        for (slot, var) in [
            (&mut self.deepgram_api_key, "DEEPGRAM_API_KEY"),
            (&mut self.groq_api_key, "GROQ_API_KEY"),
            (&mut self.openai_api_key, "OPENAI_API_KEY"),
        ] {
            if slot.is_none() {
                if let Ok(value) = std::env::var(var) {
                    if !value.is_empty() {
                        *slot = Some(value);
                    }
                }
            }
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing filter directive, e.g. "info" or "duplex=debug".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}
