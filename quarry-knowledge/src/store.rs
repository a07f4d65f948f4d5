//! Store backends and their registration table.
//!
//! A [`DocumentStore`] wraps the index machinery for one `store_kind`. The
//! chunk registry itself is owned by the instance and shared into the store
//! by handle, so releasing a store on deactivation never drops chunks.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use quarry_core::RetrievalSettings;

use crate::config::StoreKind;
use crate::embeddings::EmbeddingClient;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::fusion::{FusionRetriever, Ranker};
use crate::lexical::LexicalIndex;
use crate::models::{ChunkRegistry, DocumentChunk, FusionResult};
use crate::paths;
use crate::persist::write_chunk_blob;
use crate::vector::VectorIndex;

/// Everything a store implementation receives at construction.
pub struct StoreContext {
    /// Shared handle to the owning instance's chunk registry.
    pub registry: Arc<RwLock<ChunkRegistry>>,
    pub embedder: Arc<EmbeddingClient>,
    /// `[lexical, vector]` weights from the knowledge base config.
    pub fusion_weights: [f32; 2],
    pub settings: RetrievalSettings,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Rebuild indexes and return a retriever. With `chunks` given, build
    /// over exactly that list; otherwise flatten the shared registry.
    async fn build(&mut self, chunks: Option<Vec<DocumentChunk>>)
    -> KnowledgeResult<FusionRetriever>;

    /// Query through the current retriever, building lazily when none
    /// exists or the registry changed since the last build.
    async fn invoke(&mut self, query: &str) -> KnowledgeResult<Vec<FusionResult>>;

    /// Register chunks for a document and invalidate built indexes.
    async fn add_chunks(&mut self, doc_key: &str, chunks: Vec<DocumentChunk>);

    /// Drop a document's chunks; the index is rebuilt lazily on next use.
    /// Returns whether the document was present.
    async fn delete_doc(&mut self, doc_key: &str) -> bool;

    async fn list_docs(&self) -> Vec<String>;

    async fn list_chunks(&self, doc_key: &str) -> Vec<DocumentChunk>;

    /// Write the chunk registry blob into the knowledge base directory.
    async fn persist(&self, kb_dir: &Path) -> KnowledgeResult<()>;
}

type StoreCtor = fn(StoreContext) -> Box<dyn DocumentStore>;

/// Registration table mapping store kinds to constructors. Resolved once at
/// knowledge base activation.
const STORE_TABLE: &[(StoreKind, StoreCtor)] =
    &[(StoreKind::VectorLexical, VectorLexicalStore::boxed)];

/// Resolve a store kind through the registration table.
pub fn build_store(kind: StoreKind, ctx: StoreContext) -> KnowledgeResult<Box<dyn DocumentStore>> {
    STORE_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == kind)
        .map(|(_, ctor)| ctor(ctx))
        .ok_or_else(|| KnowledgeError::UnknownStoreKind(kind.to_string()))
}

/// Hybrid BM25 + embedding store: one lexical and one vector index over the
/// same flattened chunk set, fused with the configured weights.
pub struct VectorLexicalStore {
    registry: Arc<RwLock<ChunkRegistry>>,
    embedder: Arc<EmbeddingClient>,
    fusion_weights: [f32; 2],
    settings: RetrievalSettings,
    retriever: Option<FusionRetriever>,
}

impl VectorLexicalStore {
    fn boxed(ctx: StoreContext) -> Box<dyn DocumentStore> {
        Box::new(Self {
            registry: ctx.registry,
            embedder: ctx.embedder,
            fusion_weights: ctx.fusion_weights,
            settings: ctx.settings,
            retriever: None,
        })
    }

    async fn rebuild(&mut self, mut chunks: Vec<DocumentChunk>) -> KnowledgeResult<FusionRetriever> {
        // chunks handed in ad hoc may lack sort ids; assign positionally so
        // vector upserts stay idempotent across rebuilds
        for (idx, chunk) in chunks.iter_mut().enumerate() {
            if chunk.sort_id().is_none() {
                let owner = chunk.owner_doc_hash.clone();
                chunk.assign_sort_id(format!("{owner}:{idx}"));
            }
        }

        let mut vector = VectorIndex::new(
            Arc::clone(&self.embedder),
            self.settings.search.vector_k,
            self.settings.embedding_dim,
        );
        let batch_size = self.settings.embedding_batch.max(1);
        for batch in chunks.chunks(batch_size) {
            let ids: Vec<String> = batch
                .iter()
                .map(|chunk| chunk.sort_id().unwrap_or_default().to_string())
                .collect();
            // a failed batch loses those vectors, not the whole build
            if let Err(err) = vector.add_documents(batch, &ids).await {
                warn!("vector upsert batch failed, skipping {} chunks: {err}", batch.len());
            }
        }

        let lexical = LexicalIndex::from_documents(chunks, self.settings.search.lexical_k);
        debug!(
            "built vector-lexical store: {} lexical chunks, {} vectors",
            lexical.len(),
            vector.len()
        );

        let retriever = FusionRetriever::new(
            vec![
                (Ranker::Lexical(Arc::new(lexical)), self.fusion_weights[0]),
                (Ranker::Vector(Arc::new(vector)), self.fusion_weights[1]),
            ],
            self.settings.search.fingerprint_chars,
        );
        self.retriever = Some(retriever.clone());
        Ok(retriever)
    }
}

#[async_trait]
impl DocumentStore for VectorLexicalStore {
    async fn build(
        &mut self,
        chunks: Option<Vec<DocumentChunk>>,
    ) -> KnowledgeResult<FusionRetriever> {
        let chunks = match chunks {
            Some(chunks) => chunks,
            None => self.registry.read().await.flatten(),
        };
        self.rebuild(chunks).await
    }

    async fn invoke(&mut self, query: &str) -> KnowledgeResult<Vec<FusionResult>> {
        let retriever = match &self.retriever {
            Some(retriever) => retriever.clone(),
            None => {
                let chunks = self.registry.read().await.flatten();
                self.rebuild(chunks).await?
            }
        };

        match self.settings.search.query_timeout_seconds {
            Some(seconds) => {
                retriever
                    .invoke_with_timeout(query, Duration::from_secs(seconds))
                    .await
            }
            None => retriever.invoke(query).await,
        }
    }

    async fn add_chunks(&mut self, doc_key: &str, chunks: Vec<DocumentChunk>) {
        self.registry.write().await.insert(doc_key, chunks);
        self.retriever = None;
    }

    async fn delete_doc(&mut self, doc_key: &str) -> bool {
        let removed = self.registry.write().await.remove(doc_key).is_some();
        if removed {
            self.retriever = None;
        }
        removed
    }

    async fn list_docs(&self) -> Vec<String> {
        self.registry
            .read()
            .await
            .doc_keys()
            .map(str::to_string)
            .collect()
    }

    async fn list_chunks(&self, doc_key: &str) -> Vec<DocumentChunk> {
        self.registry
            .read()
            .await
            .get(doc_key)
            .map(<[DocumentChunk]>::to_vec)
            .unwrap_or_default()
    }

    async fn persist(&self, kb_dir: &Path) -> KnowledgeResult<()> {
        let registry = self.registry.read().await;
        write_chunk_blob(&paths::chunks_blob_path(kb_dir), &registry).await
    }
}
