//! Per-knowledge-base configuration, persisted as `config.toml` in each
//! knowledge base directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{KnowledgeError, KnowledgeResult};

/// Which store implementation backs a knowledge base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    /// Hybrid BM25 + embedding-similarity store.
    #[default]
    VectorLexical,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VectorLexical => "vector-lexical",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector-lexical" => Ok(Self::VectorLexical),
            other => Err(KnowledgeError::UnknownStoreKind(other.to_string())),
        }
    }
}

/// Which document processor chunks ingested files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessorKind {
    /// Heading-aware markdown / plain-text chunking.
    #[default]
    Markdown,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
        }
    }
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorKind {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(Self::Markdown),
            other => Err(KnowledgeError::UnknownProcessorKind(other.to_string())),
        }
    }
}

/// Validated, persisted configuration for one knowledge base.
///
/// Round-trips exactly through TOML: `load` validates after parsing and
/// `save` validates before writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Unique, immutable identifier. Must be non-empty.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub store_kind: StoreKind,
    /// Embedding provider name. Must resolve to a recognized provider at
    /// activation, otherwise the instance degrades (still listable).
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub processor_kind: ProcessorKind,
    /// Content-hash+extension document key → original file name.
    #[serde(default)]
    pub file_registry: BTreeMap<String, String>,
    /// `[lexical, vector]` ranker weights. Non-negative; need not sum to 1.
    #[serde(default = "default_fusion_weights")]
    pub fusion_weights: [f32; 2],
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_model() -> String {
    "bge-m3".to_string()
}

fn default_fusion_weights() -> [f32; 2] {
    [0.5, 0.5]
}

impl KnowledgeBaseConfig {
    /// A default config for a freshly created knowledge base.
    pub fn new(name: impl Into<String>) -> KnowledgeResult<Self> {
        let config = Self {
            name: name.into(),
            description: String::new(),
            store_kind: StoreKind::default(),
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            processor_kind: ProcessorKind::default(),
            file_registry: BTreeMap::new(),
            fusion_weights: default_fusion_weights(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> KnowledgeResult<()> {
        if self.name.trim().is_empty() {
            return Err(KnowledgeError::ConfigValidation(
                "knowledge base name must not be empty".to_string(),
            ));
        }
        if self.embedding_provider.trim().is_empty() {
            return Err(KnowledgeError::ConfigValidation(
                "an embedding provider is required".to_string(),
            ));
        }
        if self.fusion_weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(KnowledgeError::ConfigValidation(
                "fusion weights must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn load(path: &Path) -> KnowledgeResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> KnowledgeResult<()> {
        self.validate()?;
        let raw = toml::to_string_pretty(self)?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = KnowledgeBaseConfig::new("docs").unwrap();
        assert_eq!(config.name, "docs");
        assert_eq!(config.store_kind, StoreKind::VectorLexical);
        assert_eq!(config.fusion_weights, [0.5, 0.5]);
        assert!(config.file_registry.is_empty());
    }

    #[test]
    fn empty_name_fails_validation() {
        let result = KnowledgeBaseConfig::new("  ");
        assert!(matches!(result, Err(KnowledgeError::ConfigValidation(_))));
    }

    #[test]
    fn missing_provider_fails_validation() {
        let mut config = KnowledgeBaseConfig::new("docs").unwrap();
        config.embedding_provider = String::new();
        assert!(matches!(
            config.validate(),
            Err(KnowledgeError::ConfigValidation(_))
        ));
    }

    #[test]
    fn negative_weight_fails_validation() {
        let mut config = KnowledgeBaseConfig::new("docs").unwrap();
        config.fusion_weights = [-0.1, 0.8];
        assert!(matches!(
            config.validate(),
            Err(KnowledgeError::ConfigValidation(_))
        ));
    }

    #[test]
    fn toml_round_trip_is_exact() {
        let mut config = KnowledgeBaseConfig::new("manuals").unwrap();
        config.description = "product manuals".to_string();
        config.fusion_weights = [0.2, 0.8];
        config
            .file_registry
            .insert("deadbeef.md".to_string(), "intro.md".to_string());

        let raw = toml::to_string_pretty(&config).unwrap();
        let parsed: KnowledgeBaseConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn store_kind_parses_kebab_case() {
        assert_eq!(
            "vector-lexical".parse::<StoreKind>().unwrap(),
            StoreKind::VectorLexical
        );
        assert!("graph".parse::<StoreKind>().is_err());
    }

    #[tokio::test]
    async fn load_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = KnowledgeBaseConfig::new("notes").unwrap();
        config.save(&path).await.unwrap();

        let loaded = KnowledgeBaseConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }
}
