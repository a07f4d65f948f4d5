//! In-memory vector index backed by an [`EmbeddingClient`].
//!
//! Holds (chunk, embedding) pairs keyed by the chunk's stable sort id so
//! repeated upserts of the same chunk replace rather than duplicate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::embeddings::EmbeddingClient;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::DocumentChunk;

pub struct VectorIndex {
    embedder: Arc<EmbeddingClient>,
    slots: HashMap<String, usize>,
    entries: Vec<(DocumentChunk, Vec<f32>)>,
    limit: usize,
    expected_dim: Option<usize>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<EmbeddingClient>, limit: usize, expected_dim: Option<usize>) -> Self {
        Self {
            embedder,
            slots: HashMap::new(),
            entries: Vec::new(),
            limit,
            expected_dim,
        }
    }

    /// Embed and upsert a batch of chunks. `ids` must parallel `batch`;
    /// an id already present replaces its entry (idempotent upsert).
    pub async fn add_documents(
        &mut self,
        batch: &[DocumentChunk],
        ids: &[String],
    ) -> KnowledgeResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if batch.len() != ids.len() {
            return Err(KnowledgeError::Embedding(format!(
                "batch/id length mismatch: {} vs {}",
                batch.len(),
                ids.len()
            )));
        }

        let inputs: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&inputs).await?;
        if embeddings.len() != batch.len() {
            return Err(KnowledgeError::Embedding(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            )));
        }
        if let Some(expected) = self.expected_dim {
            for embedding in &embeddings {
                if embedding.len() != expected {
                    return Err(KnowledgeError::EmbeddingDimMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
            }
        }

        for ((chunk, id), embedding) in batch.iter().zip(ids).zip(embeddings) {
            self.upsert(chunk.clone(), id, embedding);
        }

        Ok(())
    }

    pub(crate) fn upsert(&mut self, chunk: DocumentChunk, id: &str, embedding: Vec<f32>) {
        match self.slots.get(id) {
            Some(&slot) => self.entries[slot] = (chunk, embedding),
            None => {
                self.slots.insert(id.to_string(), self.entries.len());
                self.entries.push((chunk, embedding));
            }
        }
    }

    /// Embed the query and return the closest chunks with their cosine
    /// similarity, best first, capped at the configured limit.
    pub async fn similarity_search_with_score(
        &self,
        query: &str,
    ) -> KnowledgeResult<Vec<(DocumentChunk, f32)>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.embedder.embed_batch(&[query.to_string()]).await?;
        let Some(query_vec) = embeddings.first() else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(DocumentChunk, f32)> = self
            .entries
            .iter()
            .map(|(chunk, embedding)| (chunk.clone(), cosine_similarity(query_vec, embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.limit);
        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
