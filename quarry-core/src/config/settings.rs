//! Settings configuration loaded from TOML files.
//!
//! This module handles non-sensitive configuration stored in TOML format
//! in the XDG config directory (~/.config/quarry/config.toml). Every field
//! is optional; resolved defaults live in [`super::RetrievalSettings`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Cannot determine config directory")]
    MissingConfigDir,

    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// User-facing settings, as written in the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Filesystem location overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root directory holding one subdirectory per knowledge base.
    pub kb_root: Option<PathBuf>,
    /// Directory for processed-chunk cache blobs.
    pub cache_dir: Option<PathBuf>,
}

/// Document-cache eviction knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    pub ttl_days: Option<u64>,
    pub max_bytes: Option<u64>,
    pub sweep_seconds: Option<u64>,
}

/// Embedding endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub url: Option<String>,
    pub batch: Option<usize>,
    pub dim: Option<usize>,
}

/// Search tuning overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSettings {
    pub vector_k: Option<usize>,
    pub lexical_k: Option<usize>,
    pub fingerprint_chars: Option<usize>,
    pub query_timeout_seconds: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
}

impl Settings {
    /// Default location of the settings file.
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        let dir = dirs::config_dir().ok_or(SettingsError::MissingConfigDir)?;
        Ok(dir.join("quarry").join("config.toml"))
    }

    /// Load settings from the default location. A missing file is not an
    /// error; it yields default settings.
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::config_path()?;
        if !path.exists() {
            tracing::debug!("no settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load settings from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert!(settings.paths.kb_root.is_none());
        assert!(settings.cache.ttl_days.is_none());
        assert!(settings.embedding.url.is_none());
        assert!(settings.search.vector_k.is_none());
        assert!(settings.logging.level.is_none());
    }

    #[test]
    fn test_parse_full_settings() {
        let raw = r#"
            [paths]
            kb_root = "/tmp/kbs"
            cache_dir = "/tmp/cache"

            [cache]
            ttl_days = 3
            max_bytes = 1000
            sweep_seconds = 30

            [embedding]
            url = "http://localhost:11434"
            batch = 16

            [search]
            vector_k = 10
            fingerprint_chars = 64

            [logging]
            level = "debug"
        "#;

        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.paths.kb_root, Some(PathBuf::from("/tmp/kbs")));
        assert_eq!(settings.cache.ttl_days, Some(3));
        assert_eq!(settings.cache.max_bytes, Some(1000));
        assert_eq!(settings.embedding.batch, Some(16));
        assert_eq!(settings.search.fingerprint_chars, Some(64));
        assert_eq!(settings.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_parse_partial_settings() {
        let raw = r#"
            [cache]
            ttl_days = 1
        "#;

        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.cache.ttl_days, Some(1));
        assert!(settings.cache.max_bytes.is_none());
        assert!(settings.paths.kb_root.is_none());
    }

    #[test]
    fn test_load_from_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load_from(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }
}
