//! In-memory BM25 lexical index.
//!
//! Backs the `lexical` ranker of the fusion retriever. Per the backend
//! contract, `invoke` returns a ranked list without scores; the fusion layer
//! assigns lexical hits their weighted prior (or zero).

use std::collections::HashMap;

use crate::models::DocumentChunk;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    chunks: Vec<DocumentChunk>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    avg_len: f32,
    limit: usize,
}

impl LexicalIndex {
    /// Build the index over a flattened chunk list. `limit` caps how many
    /// ranked chunks `invoke` returns.
    pub fn from_documents(chunks: Vec<DocumentChunk>, limit: usize) -> Self {
        let mut term_freqs = Vec::with_capacity(chunks.len());
        let mut doc_lens = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for chunk in &chunks {
            let terms = tokenize(&chunk.content);
            doc_lens.push(terms.len());

            let mut freqs: HashMap<String, usize> = HashMap::new();
            for term in terms {
                *freqs.entry(term).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let avg_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f32 / doc_lens.len() as f32
        };

        Self {
            chunks,
            term_freqs,
            doc_lens,
            doc_freq,
            avg_len,
            limit,
        }
    }

    /// Rank chunks against the query, best first. Chunks with no matching
    /// term are omitted.
    pub fn invoke(&self, query: &str) -> Vec<DocumentChunk> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.chunks.is_empty() {
            return Vec::new();
        }

        let doc_count = self.chunks.len() as f32;
        let mut scored: Vec<(usize, f32)> = Vec::new();

        for (idx, freqs) in self.term_freqs.iter().enumerate() {
            let mut score = 0.0;
            for term in &query_terms {
                let Some(&tf) = freqs.get(term) else { continue };
                let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
                let idf = ((doc_count - df + 0.5) / (df + 0.5) + 1.0).ln();
                let tf = tf as f32;
                let len_norm =
                    1.0 - BM25_B + BM25_B * self.doc_lens[idx] as f32 / self.avg_len.max(1.0);
                score += idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * len_norm);
            }
            if score > 0.0 {
                scored.push((idx, score));
            }
        }

        // stable: equal scores keep index order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.limit);

        scored
            .into_iter()
            .map(|(idx, _)| self.chunks[idx].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}
