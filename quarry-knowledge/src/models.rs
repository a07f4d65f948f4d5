use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Metadata key holding a chunk's stable sort id.
pub const META_SORT_ID: &str = "sort_id";
/// Metadata key holding the fused score written during retrieval.
pub const META_FUSED_SCORE: &str = "fused_score";
/// Metadata key naming the ranker that contributed a fused result.
pub const META_RETRIEVAL_SOURCE: &str = "retrieval_source";
/// Metadata key holding the section/heading title a chunk came from.
pub const META_SECTION: &str = "section";
/// Metadata key holding the original file name a chunk came from.
pub const META_SOURCE_FILE: &str = "source_file";

/// A typed metadata value.
///
/// A closed enum rather than a free-form JSON value so chunk metadata stays
/// explicit in the versioned blob format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Text(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One retrievable unit of text produced by a document processor.
///
/// Immutable once stored: retrieval annotates copies, never the registry's
/// own chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    /// Ordered string → value map. Carries a stable `sort_id` once assigned.
    #[serde(default)]
    pub metadata: BTreeMap<String, MetaValue>,
    /// Content hash of the document this chunk was cut from.
    pub owner_doc_hash: String,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>, owner_doc_hash: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
            owner_doc_hash: owner_doc_hash.into(),
        }
    }

    /// The chunk's stable sort id, if one has been assigned.
    pub fn sort_id(&self) -> Option<&str> {
        self.metadata.get(META_SORT_ID).and_then(MetaValue::as_str)
    }

    /// Assign a sort id. A no-op when one is already present: sort ids are
    /// stable once assigned.
    pub fn assign_sort_id(&mut self, id: impl Into<String>) {
        self.metadata
            .entry(META_SORT_ID.to_string())
            .or_insert_with(|| MetaValue::Text(id.into()));
    }

    /// Fused score carried from an earlier retrieval pass, 0 when absent.
    /// Lets unscored rankers participate in iterative re-ranking.
    pub fn prior_fused_score(&self) -> f32 {
        self.metadata
            .get(META_FUSED_SCORE)
            .and_then(MetaValue::as_f64)
            .unwrap_or(0.0) as f32
    }

    /// Content fingerprint used for dedup: the first `chars` characters.
    pub fn fingerprint(&self, chars: usize) -> String {
        self.content.chars().take(chars).collect()
    }
}

/// The kind of ranker that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankerKind {
    Lexical,
    Vector,
}

impl RankerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
        }
    }
}

impl std::fmt::Display for RankerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fused retrieval result.
///
/// Ordered by descending fused score; ties resolve to ranker registration
/// order (stable sort).
#[derive(Debug, Clone)]
pub struct FusionResult {
    pub chunk: DocumentChunk,
    pub fused_score: f32,
    /// Which ranker contributed the surviving copy of this chunk.
    pub source: RankerKind,
}

/// The chunk registry of one knowledge base: docKey → ordered chunk list.
///
/// Keys are `"<sha256>.<ext>"` document keys; iteration order is
/// deterministic (sorted by key).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkRegistry {
    docs: BTreeMap<String, Vec<DocumentChunk>>,
}

impl ChunkRegistry {
    pub fn insert(&mut self, doc_key: impl Into<String>, chunks: Vec<DocumentChunk>) {
        self.docs.insert(doc_key.into(), chunks);
    }

    pub fn remove(&mut self, doc_key: &str) -> Option<Vec<DocumentChunk>> {
        self.docs.remove(doc_key)
    }

    pub fn get(&self, doc_key: &str) -> Option<&[DocumentChunk]> {
        self.docs.get(doc_key).map(Vec::as_slice)
    }

    pub fn contains(&self, doc_key: &str) -> bool {
        self.docs.contains_key(doc_key)
    }

    pub fn doc_keys(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }

    /// Flatten the map-of-lists into one chunk list (registry order).
    pub fn flatten(&self) -> Vec<DocumentChunk> {
        self.docs.values().flatten().cloned().collect()
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.docs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Lifecycle state of a knowledge base instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    /// Config loaded, no resources resident.
    Discovered,
    /// Embedding client and store resident.
    Activated,
    /// Activation failed non-fatally; see the status message.
    Degraded,
    /// Resources released; chunk registry retained.
    Deactivated,
}

impl ActivationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Activated => "activated",
            Self::Degraded => "degraded",
            Self::Deactivated => "deactivated",
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `add_documents` call. Partial success is normal.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Document keys newly added to the registry.
    pub added: Vec<String>,
    /// Paths skipped because their content hash was already registered.
    pub skipped: Vec<PathBuf>,
    /// Paths that failed, with the reason. Does not abort the batch.
    pub failed: Vec<(PathBuf, String)>,
}

/// Read-only snapshot of the eviction queue.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub total_files: usize,
    pub total_size: u64,
    pub max_size: u64,
    /// Countdown to the soonest expiry; `None` when the queue is empty.
    pub next_expiry_in: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_id_is_stable_once_assigned() {
        let mut chunk = DocumentChunk::new("body", "abc");
        assert!(chunk.sort_id().is_none());

        chunk.assign_sort_id("abc:0");
        chunk.assign_sort_id("abc:9");
        assert_eq!(chunk.sort_id(), Some("abc:0"));
    }

    #[test]
    fn fingerprint_truncates_on_chars_not_bytes() {
        let chunk = DocumentChunk::new("héllo wörld", "abc");
        assert_eq!(chunk.fingerprint(5), "héllo");
    }

    #[test]
    fn prior_fused_score_defaults_to_zero() {
        let mut chunk = DocumentChunk::new("body", "abc");
        assert_eq!(chunk.prior_fused_score(), 0.0);

        chunk
            .metadata
            .insert(META_FUSED_SCORE.to_string(), MetaValue::Float(0.4));
        assert_eq!(chunk.prior_fused_score(), 0.4);
    }

    #[test]
    fn registry_flatten_is_deterministic() {
        let mut registry = ChunkRegistry::default();
        registry.insert("b.txt", vec![DocumentChunk::new("two", "b")]);
        registry.insert("a.txt", vec![DocumentChunk::new("one", "a")]);

        let flat = registry.flatten();
        assert_eq!(flat.len(), 2);
        // BTreeMap key order: a.txt before b.txt
        assert_eq!(flat[0].content, "one");
        assert_eq!(flat[1].content, "two");
    }
}
