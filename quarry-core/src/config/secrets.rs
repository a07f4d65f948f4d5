//! Secrets configuration loaded from environment variables only.
//!
//! This module handles sensitive configuration like API keys that should
//! never be stored in files. All secrets are read from environment variables.

use std::env;

/// Secrets loaded exclusively from environment variables.
///
/// These are sensitive values that should never be written to disk
/// or committed to version control.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    /// API key for the embedding endpoint (env: QUARRY_EMBEDDING_API_KEY).
    /// Optional: local endpoints (Ollama) need no key.
    pub embedding_api_key: Option<String>,
}

/// Errors that can occur when loading secrets
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("Secret {0} is set but empty")]
    EmptySecret(&'static str),
}

impl Secrets {
    /// Load secrets from environment variables.
    ///
    /// This function also loads .env file if present (for development),
    /// but production should rely on actual environment variables.
    pub fn from_env() -> Result<Self, SecretsError> {
        // Load .env file if present (development convenience)
        let _ = dotenvy::dotenv();

        Self::from_env_inner()
    }

    /// Internal method to load from environment without loading .env
    pub(crate) fn from_env_inner() -> Result<Self, SecretsError> {
        let embedding_api_key = match env::var("QUARRY_EMBEDDING_API_KEY") {
            Ok(value) if value.trim().is_empty() => {
                return Err(SecretsError::EmptySecret("QUARRY_EMBEDDING_API_KEY"));
            }
            Ok(value) => Some(value),
            Err(_) => None,
        };

        Ok(Self { embedding_api_key })
    }
}
