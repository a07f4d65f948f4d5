use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("invalid knowledge base config: {0}")]
    ConfigValidation(String),
    #[error("unsupported embedding provider: {0}")]
    UnsupportedProvider(String),
    #[error("unknown store kind: {0}")]
    UnknownStoreKind(String),
    #[error("unknown processor kind: {0}")]
    UnknownProcessorKind(String),
    #[error("unknown knowledge base: {0}")]
    UnknownKnowledgeBase(String),
    #[error("knowledge base '{name}' unavailable: {status}")]
    Unavailable { name: String, status: String },
    #[error("missing data directory")]
    MissingDataDir,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("toml serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimMismatch { expected: usize, actual: usize },
    #[error("ingestion failed for {path}: {reason}")]
    Ingestion { path: PathBuf, reason: String },
    #[error("ranker '{ranker}' failed: {reason}")]
    Ranker { ranker: String, reason: String },
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("chunk blob format error: {0}")]
    BlobFormat(String),
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;
