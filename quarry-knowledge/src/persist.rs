//! Versioned binary persistence for chunk data.
//!
//! Blob layout: 4-byte magic, little-endian u16 format version, bincode
//! payload. The explicit header keeps the on-disk format language-neutral
//! and lets unknown versions fail with a typed error instead of garbage.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::{ChunkRegistry, DocumentChunk};

const BLOB_MAGIC: [u8; 4] = *b"QRYB";
const BLOB_VERSION: u16 = 1;
const HEADER_LEN: usize = 6;

/// Write the full chunk registry of one knowledge base.
pub async fn write_chunk_blob(path: &Path, registry: &ChunkRegistry) -> KnowledgeResult<()> {
    let bytes = encode(registry)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|err| KnowledgeError::Persistence(format!("{}: {err}", path.display())))?;
    debug!(
        "wrote chunk blob: {} ({} docs)",
        path.display(),
        registry.doc_count()
    );
    Ok(())
}

/// Read a chunk registry blob written by [`write_chunk_blob`].
pub async fn read_chunk_blob(path: &Path) -> KnowledgeResult<ChunkRegistry> {
    let bytes = tokio::fs::read(path).await?;
    decode(&bytes)
}

/// Write one document's processed chunks into the cache directory.
pub async fn write_cache_blob(path: &Path, chunks: &[DocumentChunk]) -> KnowledgeResult<()> {
    let bytes = encode(&chunks.to_vec())?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|err| KnowledgeError::Persistence(format!("{}: {err}", path.display())))?;
    Ok(())
}

/// Read a processed-chunk cache blob written by [`write_cache_blob`].
pub async fn read_cache_blob(path: &Path) -> KnowledgeResult<Vec<DocumentChunk>> {
    let bytes = tokio::fs::read(path).await?;
    decode(&bytes)
}

fn encode<T: Serialize>(payload: &T) -> KnowledgeResult<Vec<u8>> {
    let body = bincode::serialize(payload)
        .map_err(|err| KnowledgeError::BlobFormat(format!("serialize failed: {err}")))?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&BLOB_MAGIC);
    out.extend_from_slice(&BLOB_VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> KnowledgeResult<T> {
    if bytes.len() < HEADER_LEN {
        return Err(KnowledgeError::BlobFormat("blob truncated".to_string()));
    }
    if bytes[..4] != BLOB_MAGIC {
        return Err(KnowledgeError::BlobFormat("bad magic".to_string()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != BLOB_VERSION {
        return Err(KnowledgeError::BlobFormat(format!(
            "unsupported blob version {version}"
        )));
    }

    bincode::deserialize(&bytes[HEADER_LEN..])
        .map_err(|err| KnowledgeError::BlobFormat(format!("deserialize failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{META_SECTION, MetaValue};

    fn sample_registry() -> ChunkRegistry {
        let mut chunk = DocumentChunk::new("# Intro\nsome text", "cafe01");
        chunk.assign_sort_id("cafe01:0");
        chunk
            .metadata
            .insert(META_SECTION.to_string(), MetaValue::from("Intro"));

        let mut registry = ChunkRegistry::default();
        registry.insert("cafe01.md", vec![chunk, DocumentChunk::new("more", "cafe01")]);
        registry.insert("beef02.txt", vec![DocumentChunk::new("other doc", "beef02")]);
        registry
    }

    #[tokio::test]
    async fn chunk_blob_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.blob");

        let registry = sample_registry();
        write_chunk_blob(&path, &registry).await.unwrap();

        let loaded = read_chunk_blob(&path).await.unwrap();
        assert_eq!(loaded, registry);
    }

    #[tokio::test]
    async fn cache_blob_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cafe01.md.blob");

        let chunks = sample_registry().flatten();
        write_cache_blob(&path, &chunks).await.unwrap();

        let loaded = read_cache_blob(&path).await.unwrap();
        assert_eq!(loaded, chunks);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode(&sample_registry()).unwrap();
        bytes[0] = b'X';
        let result: KnowledgeResult<ChunkRegistry> = decode(&bytes);
        assert!(matches!(result, Err(KnowledgeError::BlobFormat(_))));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut bytes = encode(&sample_registry()).unwrap();
        bytes[4] = 0xFF;
        bytes[5] = 0xFF;
        let result: KnowledgeResult<ChunkRegistry> = decode(&bytes);
        assert!(matches!(result, Err(KnowledgeError::BlobFormat(_))));
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let result: KnowledgeResult<ChunkRegistry> = decode(b"QRY");
        assert!(matches!(result, Err(KnowledgeError::BlobFormat(_))));
    }
}
