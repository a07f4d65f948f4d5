//! Knowledge base management and hybrid retrieval for quarry.
//!
//! A [`KnowledgeBaseRegistry`] discovers one knowledge base per directory
//! under the configured root, lazily activates each one on first use
//! (embedding client + in-memory indexes), and serves queries through a
//! score-fusion retriever over a lexical (BM25) and a vector ranker. An
//! [`EvictionQueue`] bounds the age and total size of the processed-chunk
//! cache on disk.

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod eviction;
pub mod fusion;
pub mod instance;
pub mod lexical;
pub mod models;
pub mod paths;
pub mod persist;
pub mod processor;
pub mod registry;
pub mod store;
pub mod vector;

pub use quarry_core::{RetrievalSettings, SearchDefaults};

pub use config::{KnowledgeBaseConfig, ProcessorKind, StoreKind};
pub use embeddings::{EmbeddingClient, EmbeddingProvider};
pub use errors::{KnowledgeError, KnowledgeResult};
pub use eviction::EvictionQueue;
pub use fusion::{FusionRetriever, Ranker};
pub use instance::KnowledgeBaseInstance;
pub use lexical::LexicalIndex;
pub use models::{
    ActivationState, ChunkRegistry, DocumentChunk, FusionResult, IngestReport, MetaValue,
    QueueStats, RankerKind,
};
pub use processor::{DocumentProcessor, MarkdownProcessor};
pub use registry::KnowledgeBaseRegistry;
pub use store::{DocumentStore, StoreContext};
pub use vector::VectorIndex;
