//! Score-fusion retrieval over heterogeneous rankers.
//!
//! Each registered ranker contributes either scored pairs (vector) or an
//! unscored ranked list (lexical). Scores are weighted, merged, stably
//! sorted, and deduplicated by content fingerprint; survivors carry
//! `fused_score` and `retrieval_source` annotations in their metadata.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::lexical::LexicalIndex;
use crate::models::{
    DocumentChunk, FusionResult, META_FUSED_SCORE, META_RETRIEVAL_SOURCE, MetaValue, RankerKind,
};
use crate::vector::VectorIndex;

/// One ranker registered with the retriever.
#[derive(Clone)]
pub enum Ranker {
    Lexical(Arc<LexicalIndex>),
    Vector(Arc<VectorIndex>),
}

impl Ranker {
    pub fn kind(&self) -> RankerKind {
        match self {
            Self::Lexical(_) => RankerKind::Lexical,
            Self::Vector(_) => RankerKind::Vector,
        }
    }
}

/// A weighted ranker contribution awaiting fusion.
#[derive(Debug, Clone)]
struct Weighted {
    chunk: DocumentChunk,
    score: f32,
    source: RankerKind,
}

#[derive(Clone)]
pub struct FusionRetriever {
    rankers: Vec<(Ranker, f32)>,
    fingerprint_chars: usize,
}

impl FusionRetriever {
    /// Build a retriever over `(ranker, weight)` pairs. Registration order
    /// is the tie-break order for equal fused scores. A weight of 0 keeps a
    /// ranker in provenance tracking while nullifying its scores.
    pub fn new(rankers: Vec<(Ranker, f32)>, fingerprint_chars: usize) -> Self {
        Self {
            rankers,
            fingerprint_chars,
        }
    }

    /// Run every ranker and fuse the results.
    ///
    /// All-rankers-empty yields `Ok(vec![])`; a ranker failure propagates;
    /// fallback policy belongs to the caller.
    pub async fn invoke(&self, query: &str) -> KnowledgeResult<Vec<FusionResult>> {
        let mut combined = Vec::new();
        for (ranker, weight) in &self.rankers {
            let outputs = run_ranker(ranker, query).await?;
            weigh_into(&mut combined, outputs, *weight, ranker.kind());
        }
        Ok(fuse(combined, self.fingerprint_chars))
    }

    /// Like [`invoke`](Self::invoke), but bounds each ranker call by
    /// `timeout`. A ranker that exceeds it is dropped from this invocation
    /// with a warning; the fused result is built from the rankers that
    /// finished. Ranker errors still propagate.
    pub async fn invoke_with_timeout(
        &self,
        query: &str,
        timeout: Duration,
    ) -> KnowledgeResult<Vec<FusionResult>> {
        let mut combined = Vec::new();
        for (ranker, weight) in &self.rankers {
            match tokio::time::timeout(timeout, run_ranker(ranker, query)).await {
                Ok(outputs) => weigh_into(&mut combined, outputs?, *weight, ranker.kind()),
                Err(_) => {
                    warn!(
                        "{} ranker timed out after {:?}; returning partial results",
                        ranker.kind(),
                        timeout
                    );
                }
            }
        }
        Ok(fuse(combined, self.fingerprint_chars))
    }

    pub fn ranker_count(&self) -> usize {
        self.rankers.len()
    }
}

async fn run_ranker(
    ranker: &Ranker,
    query: &str,
) -> KnowledgeResult<Vec<(DocumentChunk, Option<f32>)>> {
    match ranker {
        Ranker::Vector(index) => {
            let scored = index
                .similarity_search_with_score(query)
                .await
                .map_err(|err| KnowledgeError::Ranker {
                    ranker: RankerKind::Vector.to_string(),
                    reason: err.to_string(),
                })?;
            Ok(scored
                .into_iter()
                .map(|(chunk, score)| (chunk, Some(score)))
                .collect())
        }
        Ranker::Lexical(index) => Ok(index
            .invoke(query)
            .into_iter()
            .map(|chunk| (chunk, None))
            .collect()),
    }
}

/// Weight raw ranker outputs into the merge buffer. Unscored entries fall
/// back to a prior fused score carried in metadata, else 0, so lexical-only
/// hits rank below any positively-scored vector hit unless re-ranked.
fn weigh_into(
    combined: &mut Vec<Weighted>,
    outputs: Vec<(DocumentChunk, Option<f32>)>,
    weight: f32,
    source: RankerKind,
) {
    for (chunk, raw_score) in outputs {
        let raw = raw_score.unwrap_or_else(|| chunk.prior_fused_score());
        combined.push(Weighted {
            chunk,
            score: raw * weight,
            source,
        });
    }
}

/// Merge weighted contributions into one deduplicated, ordered result list.
///
/// Stable sort on weighted score descending; duplicates (same content
/// fingerprint) keep their first (highest-scored) occurrence, so a chunk
/// found by several rankers is credited to whichever weighted it higher.
fn fuse(mut combined: Vec<Weighted>, fingerprint_chars: usize) -> Vec<FusionResult> {
    combined.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for Weighted {
        mut chunk,
        score,
        source,
    } in combined
    {
        if !seen.insert(chunk.fingerprint(fingerprint_chars)) {
            continue;
        }
        chunk.metadata.insert(
            META_FUSED_SCORE.to_string(),
            MetaValue::Float(f64::from(score)),
        );
        chunk.metadata.insert(
            META_RETRIEVAL_SOURCE.to_string(),
            MetaValue::from(source.as_str()),
        );
        results.push(FusionResult {
            chunk,
            fused_score: score,
            source,
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> DocumentChunk {
        DocumentChunk::new(content, "test")
    }

    fn scored(content: &str, score: f32) -> (DocumentChunk, Option<f32>) {
        (chunk(content), Some(score))
    }

    fn unscored(content: &str) -> (DocumentChunk, Option<f32>) {
        (chunk(content), None)
    }

    /// Lexical [(A,-),(B,-)] at 0.2 fused with vector [(A,0.9),(C,0.5)] at
    /// 0.8 orders A (0.72, credited to vector), C (0.40), B (0, lexical).
    #[test]
    fn scenario_c_orders_by_fused_score() {
        let mut combined = Vec::new();
        weigh_into(
            &mut combined,
            vec![unscored("chunk A"), unscored("chunk B")],
            0.2,
            RankerKind::Lexical,
        );
        weigh_into(
            &mut combined,
            vec![scored("chunk A", 0.9), scored("chunk C", 0.5)],
            0.8,
            RankerKind::Vector,
        );

        let results = fuse(combined, 100);
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].chunk.content, "chunk A");
        assert!((results[0].fused_score - 0.72).abs() < 1e-6);
        assert_eq!(results[0].source, RankerKind::Vector);

        assert_eq!(results[1].chunk.content, "chunk C");
        assert!((results[1].fused_score - 0.40).abs() < 1e-6);

        assert_eq!(results[2].chunk.content, "chunk B");
        assert_eq!(results[2].fused_score, 0.0);
        assert_eq!(results[2].source, RankerKind::Lexical);
    }

    #[test]
    fn fusion_is_deterministic() {
        let build = || {
            let mut combined = Vec::new();
            weigh_into(
                &mut combined,
                vec![unscored("one"), unscored("two"), unscored("three")],
                0.3,
                RankerKind::Lexical,
            );
            weigh_into(
                &mut combined,
                vec![scored("two", 0.8), scored("four", 0.8), scored("one", 0.2)],
                0.7,
                RankerKind::Vector,
            );
            combined
        };

        let first = fuse(build(), 100);
        let second = fuse(build(), 100);

        let order = |results: &[FusionResult]| {
            results
                .iter()
                .map(|r| (r.chunk.content.clone(), r.source))
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
    }

    #[test]
    fn dedup_keeps_no_fingerprint_twice() {
        let mut combined = Vec::new();
        weigh_into(
            &mut combined,
            vec![unscored("duplicate body"), unscored("duplicate body")],
            0.5,
            RankerKind::Lexical,
        );
        weigh_into(
            &mut combined,
            vec![scored("duplicate body", 0.9)],
            0.5,
            RankerKind::Vector,
        );

        let results = fuse(combined, 100);
        let fingerprints: Vec<String> =
            results.iter().map(|r| r.chunk.fingerprint(100)).collect();
        let unique: HashSet<&String> = fingerprints.iter().collect();
        assert_eq!(fingerprints.len(), unique.len());
        assert_eq!(results.len(), 1);
        // the higher weighted copy (vector, 0.45) survives
        assert_eq!(results[0].source, RankerKind::Vector);
    }

    #[test]
    fn fingerprint_length_controls_dedup() {
        let a = "shared prefix, divergent tail one";
        let b = "shared prefix, divergent tail two";

        let mut combined = Vec::new();
        weigh_into(
            &mut combined,
            vec![scored(a, 0.9), scored(b, 0.5)],
            1.0,
            RankerKind::Vector,
        );

        // a fingerprint shorter than the common prefix collapses both
        assert_eq!(fuse(combined.clone(), 13).len(), 1);
        // a longer fingerprint keeps them distinct
        assert_eq!(fuse(combined, 100).len(), 2);
    }

    #[test]
    fn raising_a_weight_never_demotes_its_results() {
        let run = |vector_weight: f32| {
            let mut combined = Vec::new();
            weigh_into(
                &mut combined,
                vec![
                    (
                        {
                            let mut c = chunk("lexical favourite");
                            c.metadata.insert(
                                META_FUSED_SCORE.to_string(),
                                MetaValue::Float(0.9),
                            );
                            c
                        },
                        None,
                    ),
                    unscored("lexical filler"),
                ],
                0.5,
                RankerKind::Lexical,
            );
            weigh_into(
                &mut combined,
                vec![scored("vector hit", 0.6)],
                vector_weight,
                RankerKind::Vector,
            );
            fuse(combined, 100)
        };

        let rank_of = |results: &[FusionResult], content: &str| {
            results
                .iter()
                .position(|r| r.chunk.content == content)
                .unwrap()
        };

        let low = run(0.2);
        let high = run(0.9);
        assert!(rank_of(&high, "vector hit") <= rank_of(&low, "vector hit"));
    }

    #[test]
    fn zero_weight_disables_scores_but_keeps_provenance() {
        let mut combined = Vec::new();
        weigh_into(
            &mut combined,
            vec![scored("muted", 0.9)],
            0.0,
            RankerKind::Vector,
        );

        let results = fuse(combined, 100);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fused_score, 0.0);
        assert_eq!(results[0].source, RankerKind::Vector);
        assert_eq!(
            results[0]
                .chunk
                .metadata
                .get(META_RETRIEVAL_SOURCE)
                .and_then(MetaValue::as_str),
            Some("vector")
        );
    }

    #[test]
    fn unscored_entries_reuse_prior_fused_score() {
        let mut reranked = chunk("previously fused");
        reranked
            .metadata
            .insert(META_FUSED_SCORE.to_string(), MetaValue::Float(0.6));

        let mut combined = Vec::new();
        weigh_into(
            &mut combined,
            vec![(reranked, None), unscored("fresh")],
            0.5,
            RankerKind::Lexical,
        );

        let results = fuse(combined, 100);
        assert_eq!(results[0].chunk.content, "previously fused");
        assert!((results[0].fused_score - 0.3).abs() < 1e-6);
        assert_eq!(results[1].fused_score, 0.0);
    }

    #[test]
    fn empty_rankers_fuse_to_empty() {
        assert!(fuse(Vec::new(), 100).is_empty());
    }

    #[test]
    fn survivors_carry_annotations() {
        let mut combined = Vec::new();
        weigh_into(
            &mut combined,
            vec![scored("annotated", 0.5)],
            0.8,
            RankerKind::Vector,
        );

        let results = fuse(combined, 100);
        let meta = &results[0].chunk.metadata;
        assert_eq!(
            meta.get(META_FUSED_SCORE).and_then(MetaValue::as_f64),
            Some(f64::from(0.5f32 * 0.8))
        );
        assert_eq!(
            meta.get(META_RETRIEVAL_SOURCE).and_then(MetaValue::as_str),
            Some("vector")
        );
    }

    #[tokio::test]
    async fn lexical_only_retriever_invokes_end_to_end() {
        let index = LexicalIndex::from_documents(
            vec![chunk("rust async runtime"), chunk("gardening tips")],
            10,
        );
        let retriever =
            FusionRetriever::new(vec![(Ranker::Lexical(Arc::new(index)), 0.4)], 100);

        let results = retriever.invoke("rust runtime").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, RankerKind::Lexical);
        // unscored lexical hit with no prior: weighted score stays 0
        assert_eq!(results[0].fused_score, 0.0);

        let empty = retriever.invoke("quantum").await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn timeout_variant_matches_plain_invoke_for_fast_rankers() {
        let index = LexicalIndex::from_documents(vec![chunk("rust async runtime")], 10);
        let retriever =
            FusionRetriever::new(vec![(Ranker::Lexical(Arc::new(index)), 1.0)], 100);

        let plain = retriever.invoke("rust").await.unwrap();
        let timed = retriever
            .invoke_with_timeout("rust", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(plain.len(), timed.len());
    }
}
