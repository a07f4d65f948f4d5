use std::path::{Path, PathBuf};

use quarry_core::RetrievalSettings;

use crate::errors::{KnowledgeError, KnowledgeResult};

pub const KB_DIR: &str = "knowledge-bases";
pub const CACHE_DIR: &str = "document-cache";
pub const CONFIG_FILE: &str = "config.toml";
pub const CHUNKS_BLOB_FILE: &str = "chunks.blob";
pub const CACHE_BLOB_EXT: &str = "blob";

pub fn data_root() -> KnowledgeResult<PathBuf> {
    if let Ok(override_dir) = std::env::var("QUARRY_DATA_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let dir = dirs::data_dir().ok_or(KnowledgeError::MissingDataDir)?;
    Ok(dir.join("quarry"))
}

/// Root directory holding one subdirectory per knowledge base.
pub fn kb_root(settings: &RetrievalSettings) -> KnowledgeResult<PathBuf> {
    if let Some(path) = &settings.kb_root_override {
        return Ok(path.clone());
    }
    Ok(data_root()?.join(KB_DIR))
}

/// Directory holding processed-chunk cache blobs, shared across knowledge
/// bases and bounded by the eviction queue.
pub fn cache_root(settings: &RetrievalSettings) -> KnowledgeResult<PathBuf> {
    if let Some(path) = &settings.cache_dir_override {
        return Ok(path.clone());
    }
    Ok(data_root()?.join(CACHE_DIR))
}

pub fn kb_dir(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

pub fn config_path(kb_dir: &Path) -> PathBuf {
    kb_dir.join(CONFIG_FILE)
}

pub fn chunks_blob_path(kb_dir: &Path) -> PathBuf {
    kb_dir.join(CHUNKS_BLOB_FILE)
}

pub fn cache_blob_path(cache_root: &Path, doc_key: &str) -> PathBuf {
    cache_root.join(format!("{doc_key}.{CACHE_BLOB_EXT}"))
}
