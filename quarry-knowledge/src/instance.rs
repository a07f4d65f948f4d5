//! The activatable unit: one knowledge base.
//!
//! An instance is created cheaply at discovery time (config only). Expensive
//! resources (the embedding client and the store's indexes) come and go
//! with `activate_before_use` / `deactivate`, while the chunk registry stays
//! resident for the instance's whole lifetime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use quarry_core::RetrievalSettings;

use crate::config::KnowledgeBaseConfig;
use crate::embeddings::EmbeddingClient;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::eviction::EvictionQueue;
use crate::fusion::FusionRetriever;
use crate::models::{ActivationState, ChunkRegistry, DocumentChunk, FusionResult, IngestReport};
use crate::paths;
use crate::persist::{read_cache_blob, read_chunk_blob, write_cache_blob, write_chunk_blob};
use crate::processor::{DocumentProcessor, build_processor};
use crate::store::{DocumentStore, StoreContext, build_store};

struct ActiveResources {
    embedder: Arc<EmbeddingClient>,
    store: Box<dyn DocumentStore>,
}

enum Lifecycle {
    Discovered,
    Activated(ActiveResources),
    Degraded { status: String },
    Deactivated,
}

impl Lifecycle {
    fn state(&self) -> ActivationState {
        match self {
            Self::Discovered => ActivationState::Discovered,
            Self::Activated(_) => ActivationState::Activated,
            Self::Degraded { .. } => ActivationState::Degraded,
            Self::Deactivated => ActivationState::Deactivated,
        }
    }
}

pub struct KnowledgeBaseInstance {
    name: String,
    dir: PathBuf,
    cache_dir: PathBuf,
    settings: RetrievalSettings,
    api_key: Option<String>,
    eviction: Arc<EvictionQueue>,
    config: RwLock<KnowledgeBaseConfig>,
    chunks: Arc<RwLock<ChunkRegistry>>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for KnowledgeBaseInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBaseInstance")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBaseInstance {
    pub(crate) fn discovered(
        config: KnowledgeBaseConfig,
        dir: PathBuf,
        cache_dir: PathBuf,
        settings: RetrievalSettings,
        api_key: Option<String>,
        eviction: Arc<EvictionQueue>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            dir,
            cache_dir,
            settings,
            api_key,
            eviction,
            config: RwLock::new(config),
            chunks: Arc::new(RwLock::new(ChunkRegistry::default())),
            lifecycle: Mutex::new(Lifecycle::Discovered),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn config(&self) -> KnowledgeBaseConfig {
        self.config.read().await.clone()
    }

    pub async fn state(&self) -> ActivationState {
        self.lifecycle.lock().await.state()
    }

    /// The degraded-status message, if activation failed non-fatally.
    pub async fn status_message(&self) -> Option<String> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Degraded { status } => Some(status.clone()),
            _ => None,
        }
    }

    /// The embedding model of the live client, `None` unless activated.
    pub async fn active_embedding_model(&self) -> Option<String> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Activated(active) => Some(active.embedder.model().to_string()),
            _ => None,
        }
    }

    /// Bring the embedding client and store up. Idempotent: already
    /// `Activated` is a no-op. An unrecognized embedding provider degrades
    /// the instance (status message, still listable) instead of failing.
    pub async fn activate_before_use(&self) -> KnowledgeResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(*lifecycle, Lifecycle::Activated(_)) {
            return Ok(());
        }

        let config = self.config.read().await.clone();
        let embedder = match EmbeddingClient::new(
            &config.embedding_provider,
            &config.embedding_model,
            &self.settings,
            self.api_key.clone(),
        ) {
            Ok(client) => Arc::new(client),
            Err(err @ KnowledgeError::UnsupportedProvider(_)) => {
                let status = err.to_string();
                warn!("knowledge base '{}' cannot activate: {status}", self.name);
                *lifecycle = Lifecycle::Degraded { status };
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        // reload persisted chunks only when nothing is resident, so a
        // deactivate/reactivate cycle cannot clobber unsaved additions
        {
            let mut registry = self.chunks.write().await;
            if registry.is_empty() {
                let blob_path = paths::chunks_blob_path(&self.dir);
                if blob_path.exists() {
                    *registry = read_chunk_blob(&blob_path).await?;
                    debug!(
                        "loaded chunk registry for '{}': {} docs, {} chunks",
                        self.name,
                        registry.doc_count(),
                        registry.chunk_count()
                    );
                }
            }
        }

        let store = match build_store(
            config.store_kind,
            StoreContext {
                registry: Arc::clone(&self.chunks),
                embedder: Arc::clone(&embedder),
                fusion_weights: config.fusion_weights,
                settings: self.settings.clone(),
            },
        ) {
            Ok(store) => store,
            Err(err) => {
                let status = err.to_string();
                warn!("knowledge base '{}' cannot activate: {status}", self.name);
                *lifecycle = Lifecycle::Degraded { status };
                return Ok(());
            }
        };

        *lifecycle = Lifecycle::Activated(ActiveResources { embedder, store });
        info!("knowledge base '{}' activated", self.name);
        Ok(())
    }

    /// Release the embedding client and store. The chunk registry stays
    /// resident.
    pub async fn deactivate(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(*lifecycle, Lifecycle::Activated(_)) {
            *lifecycle = Lifecycle::Deactivated;
            info!("knowledge base '{}' deactivated", self.name);
        }
    }

    /// Build (or rebuild) the hybrid retriever. With `chunks` given, index
    /// exactly that list; otherwise the owned registry is flattened.
    pub async fn build_retriever(
        &self,
        chunks: Option<Vec<DocumentChunk>>,
    ) -> KnowledgeResult<FusionRetriever> {
        self.activate_before_use().await?;
        let mut lifecycle = self.lifecycle.lock().await;
        match &mut *lifecycle {
            Lifecycle::Activated(active) => active.store.build(chunks).await,
            Lifecycle::Degraded { status } => Err(self.unavailable(status)),
            _ => Err(self.unavailable("not activated")),
        }
    }

    /// Query the knowledge base, activating and lazily building the
    /// retriever as needed. A degraded instance yields a typed
    /// `Unavailable` error rather than a generic failure.
    pub async fn invoke(&self, query: &str) -> KnowledgeResult<Vec<FusionResult>> {
        self.activate_before_use().await?;
        let mut lifecycle = self.lifecycle.lock().await;
        match &mut *lifecycle {
            Lifecycle::Activated(active) => active.store.invoke(query).await,
            Lifecycle::Degraded { status } => Err(self.unavailable(status)),
            _ => Err(self.unavailable("not activated")),
        }
    }

    /// Ingest files by content hash. A hash already in the file registry is
    /// skipped (idempotent); a failing file is reported and does not abort
    /// the rest of the batch.
    pub async fn add_documents(&self, files: &[PathBuf]) -> KnowledgeResult<IngestReport> {
        let processor = {
            let config = self.config.read().await;
            build_processor(config.processor_kind)?
        };

        let mut report = IngestReport::default();
        for path in files {
            match self.ingest_one(processor.as_ref(), path).await {
                Ok(Some(doc_key)) => report.added.push(doc_key),
                Ok(None) => report.skipped.push(path.clone()),
                Err(err) => {
                    warn!("ingestion failed for {}: {err}", path.display());
                    report.failed.push((path.clone(), err.to_string()));
                }
            }
        }

        info!(
            "ingested into '{}': {} added, {} skipped, {} failed",
            self.name,
            report.added.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn ingest_one(
        &self,
        processor: &dyn DocumentProcessor,
        path: &Path,
    ) -> KnowledgeResult<Option<String>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| KnowledgeError::Ingestion {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        let hash = hex::encode(Sha256::digest(&bytes));
        let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("bin");
        let doc_key = format!("{hash}.{ext}");

        if self.config.read().await.file_registry.contains_key(&doc_key) {
            debug!("document already ingested: {}", path.display());
            return Ok(None);
        }

        let chunks = self.load_or_process(processor, path, &hash, &doc_key).await?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document")
            .to_string();

        // route through the store when activated so its retriever
        // invalidates; otherwise write the registry directly
        let mut lifecycle = self.lifecycle.lock().await;
        if let Lifecycle::Activated(active) = &mut *lifecycle {
            active.store.add_chunks(&doc_key, chunks).await;
        } else {
            self.chunks.write().await.insert(doc_key.clone(), chunks);
        }
        drop(lifecycle);

        self.config
            .write()
            .await
            .file_registry
            .insert(doc_key.clone(), file_name);

        Ok(Some(doc_key))
    }

    /// Load processed chunks from the cache when a valid blob exists
    /// (claiming the file back from the eviction queue), otherwise run the
    /// processor and cache the result.
    async fn load_or_process(
        &self,
        processor: &dyn DocumentProcessor,
        path: &Path,
        hash: &str,
        doc_key: &str,
    ) -> KnowledgeResult<Vec<DocumentChunk>> {
        let cache_path = paths::cache_blob_path(&self.cache_dir, doc_key);
        if cache_path.exists() {
            match read_cache_blob(&cache_path).await {
                Ok(chunks) => {
                    self.eviction.remove_file(&cache_path).await;
                    debug!("loaded processed chunks from cache: {}", path.display());
                    return Ok(chunks);
                }
                Err(err) => {
                    warn!(
                        "ignoring unreadable chunk cache {}: {err}",
                        cache_path.display()
                    );
                }
            }
        }

        debug!("processing document: {}", path.display());
        let chunks = processor.process(path, hash).await?;

        // cache failures cost a reprocess later, nothing more
        if let Err(err) = self.write_cache(&cache_path, &chunks).await {
            warn!("failed to cache processed chunks for {}: {err}", path.display());
        }

        Ok(chunks)
    }

    async fn write_cache(&self, cache_path: &Path, chunks: &[DocumentChunk]) -> KnowledgeResult<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        write_cache_blob(cache_path, chunks).await?;
        self.eviction.add_file(cache_path).await?;
        Ok(())
    }

    /// Remove a document by its registered file name. Chunks leave the
    /// registry immediately; index removal is lazy (next rebuild). Returns
    /// whether anything was removed.
    pub async fn delete_document(&self, file_name: &str) -> KnowledgeResult<bool> {
        let doc_keys: Vec<String> = {
            let config = self.config.read().await;
            config
                .file_registry
                .iter()
                .filter(|(_, name)| name.as_str() == file_name)
                .map(|(key, _)| key.clone())
                .collect()
        };
        if doc_keys.is_empty() {
            return Ok(false);
        }

        let mut lifecycle = self.lifecycle.lock().await;
        for doc_key in &doc_keys {
            if let Lifecycle::Activated(active) = &mut *lifecycle {
                active.store.delete_doc(doc_key).await;
            } else {
                self.chunks.write().await.remove(doc_key);
            }
        }
        drop(lifecycle);

        let mut config = self.config.write().await;
        for doc_key in &doc_keys {
            config.file_registry.remove(doc_key);
        }
        info!("deleted document '{file_name}' from '{}'", self.name);
        Ok(true)
    }

    /// Serialize the chunk registry blob and the validated config. Call
    /// before deactivation to keep added-but-unbuilt documents.
    pub async fn persist(&self) -> KnowledgeResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let registry = self.chunks.read().await;
        write_chunk_blob(&paths::chunks_blob_path(&self.dir), &registry).await?;
        drop(registry);

        let config = self.config.read().await.clone();
        config.save(&paths::config_path(&self.dir)).await?;
        debug!("persisted knowledge base '{}'", self.name);
        Ok(())
    }

    /// Registered original file names, in document-key order.
    pub async fn list_docs(&self) -> Vec<String> {
        self.config
            .read()
            .await
            .file_registry
            .values()
            .cloned()
            .collect()
    }

    /// All chunks belonging to a registered file name.
    pub async fn list_chunks(&self, file_name: &str) -> Vec<DocumentChunk> {
        let doc_keys: Vec<String> = {
            let config = self.config.read().await;
            config
                .file_registry
                .iter()
                .filter(|(_, name)| name.as_str() == file_name)
                .map(|(key, _)| key.clone())
                .collect()
        };

        let registry = self.chunks.read().await;
        doc_keys
            .iter()
            .filter_map(|key| registry.get(key))
            .flatten()
            .cloned()
            .collect()
    }

    pub async fn chunk_count(&self) -> usize {
        self.chunks.read().await.chunk_count()
    }

    fn unavailable(&self, status: &str) -> KnowledgeError {
        KnowledgeError::Unavailable {
            name: self.name.clone(),
            status: status.to_string(),
        }
    }
}
