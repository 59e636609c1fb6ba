//! Settings for the duplex voice-agent orchestrator
//!
//! Layered configuration: an optional `duplex.toml` file, overridden by
//! `DUPLEX_*` environment variables. Provider credentials come from the
//! canonical per-provider environment variables.

pub mod settings;

pub use settings::{ObservabilityConfig, OrchestratorConfig, ProviderKeys, Settings};

use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<ConfigError> for duplex_core::Error {
    fn from(err: ConfigError) -> Self {
        duplex_core::Error::Config(err.to_string())
    }
}
