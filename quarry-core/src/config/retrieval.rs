//! Retrieval system configuration types.
//!
//! These types define the resolved (non-optional) settings used by
//! `quarry-knowledge`. They are created from the user-facing TOML
//! [`Settings`] structs via `From`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::settings::Settings;

/// Resolved retrieval settings (all values filled with defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Override the root directory holding one subdirectory per knowledge
    /// base. When unset, derives from the platform data dir. Primarily for
    /// testing.
    #[serde(default)]
    pub kb_root_override: Option<PathBuf>,
    /// Override the processed-chunk cache directory.
    #[serde(default)]
    pub cache_dir_override: Option<PathBuf>,
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u64,
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: u64,
    #[serde(default = "default_sweep_seconds")]
    pub sweep_seconds: u64,
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default)]
    pub embedding_dim: Option<usize>,
    #[serde(default = "default_embedding_batch")]
    pub embedding_batch: usize,
    #[serde(default)]
    pub search: SearchDefaults,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            kb_root_override: None,
            cache_dir_override: None,
            cache_ttl_days: default_cache_ttl_days(),
            cache_max_bytes: default_cache_max_bytes(),
            sweep_seconds: default_sweep_seconds(),
            embedding_url: default_embedding_url(),
            embedding_dim: None,
            embedding_batch: default_embedding_batch(),
            search: SearchDefaults::default(),
        }
    }
}

/// Resolved search tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefaults {
    /// Result cap for the vector ranker.
    #[serde(default = "default_vector_k")]
    pub vector_k: usize,
    /// Result cap for the lexical ranker.
    #[serde(default = "default_lexical_k")]
    pub lexical_k: usize,
    /// Number of leading characters used as the dedup fingerprint during
    /// fusion. Near-duplicate chunks sharing a prefix of this length
    /// collapse into one result; raise it when that looseness matters.
    #[serde(default = "default_fingerprint_chars")]
    pub fingerprint_chars: usize,
    /// When set, each ranker call within a query is bounded by this timeout
    /// and slow rankers are dropped from that invocation (partial results).
    #[serde(default)]
    pub query_timeout_seconds: Option<u64>,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            vector_k: default_vector_k(),
            lexical_k: default_lexical_k(),
            fingerprint_chars: default_fingerprint_chars(),
            query_timeout_seconds: None,
        }
    }
}

fn default_cache_ttl_days() -> u64 {
    7
}

fn default_cache_max_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_sweep_seconds() -> u64 {
    60
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_batch() -> usize {
    32
}

fn default_vector_k() -> usize {
    20
}

fn default_lexical_k() -> usize {
    20
}

fn default_fingerprint_chars() -> usize {
    100
}

impl From<&Settings> for RetrievalSettings {
    fn from(value: &Settings) -> Self {
        let mut settings = RetrievalSettings::default();
        if let Some(path) = &value.paths.kb_root {
            settings.kb_root_override = Some(path.clone());
        }
        if let Some(path) = &value.paths.cache_dir {
            settings.cache_dir_override = Some(path.clone());
        }
        if let Some(days) = value.cache.ttl_days {
            settings.cache_ttl_days = days;
        }
        if let Some(bytes) = value.cache.max_bytes {
            settings.cache_max_bytes = bytes;
        }
        if let Some(seconds) = value.cache.sweep_seconds {
            settings.sweep_seconds = seconds;
        }
        if let Some(url) = &value.embedding.url {
            settings.embedding_url = url.clone();
        }
        if let Some(dim) = value.embedding.dim {
            settings.embedding_dim = Some(dim);
        }
        if let Some(batch) = value.embedding.batch {
            settings.embedding_batch = batch;
        }
        apply_search_overrides(&mut settings.search, &value.search);
        settings
    }
}

fn apply_search_overrides(search: &mut SearchDefaults, overrides: &super::settings::SearchSettings) {
    if let Some(vector_k) = overrides.vector_k {
        search.vector_k = vector_k;
    }
    if let Some(lexical_k) = overrides.lexical_k {
        search.lexical_k = lexical_k;
    }
    if let Some(chars) = overrides.fingerprint_chars {
        search.fingerprint_chars = chars;
    }
    if let Some(seconds) = overrides.query_timeout_seconds {
        search.query_timeout_seconds = Some(seconds);
    }
}
