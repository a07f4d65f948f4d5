//! Configuration management for quarry.
//!
//! This module provides a unified configuration system that separates
//! secrets (from environment variables) from settings (from TOML files).
//!
//! # Configuration Sources
//!
//! ## Secrets (Environment Variables)
//! - `QUARRY_EMBEDDING_API_KEY` - API key for the embedding endpoint
//!
//! ## Settings (TOML File)
//! Located at `~/.config/quarry/config.toml`:
//! ```toml
//! [paths]
//! kb_root = "/var/lib/quarry/knowledge-bases"
//!
//! [cache]
//! ttl_days = 7
//! max_bytes = 1073741824
//!
//! [embedding]
//! url = "http://127.0.0.1:11434"
//! batch = 32
//!
//! [search]
//! vector_k = 20
//! fingerprint_chars = 100
//!
//! [logging]
//! level = "info"
//! ```

mod retrieval;
mod secrets;
mod settings;

pub use retrieval::{RetrievalSettings, SearchDefaults};
pub use secrets::{Secrets, SecretsError};
pub use settings::{
    CacheSettings, EmbeddingSettings, LoggingSettings, PathSettings, SearchSettings, Settings,
    SettingsError,
};

/// Combined configuration containing both secrets and settings.
///
/// This is the main configuration type used throughout the application.
/// It separates sensitive secrets (from env) from non-sensitive settings
/// (from TOML).
#[derive(Debug, Clone)]
pub struct Config {
    /// Secrets loaded from environment variables
    pub secrets: Secrets,
    /// Settings loaded from the TOML configuration file
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl Config {
    /// Load the full configuration: secrets from the environment, settings
    /// from the default TOML location (missing file yields defaults).
    pub fn load() -> Result<Self, ConfigError> {
        let secrets = Secrets::from_env()?;
        let settings = Settings::load()?;
        Ok(Self { secrets, settings })
    }

    /// Resolved retrieval settings with all defaults filled in.
    pub fn retrieval(&self) -> RetrievalSettings {
        RetrievalSettings::from(&self.settings)
    }
}
