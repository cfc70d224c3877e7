//! Nearest-neighbour retrieval over a single static corpus.
//!
//! The index is built once (corpus → passages → embeddings with precomputed
//! norms) and is read-only afterwards, so one `Arc<KnowledgeIndex>` can serve
//! any number of concurrent sessions.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::embed::{l2_norm, Embedder};
use crate::error::ChatError;
use crate::utils::ProgressCallback;

pub mod cache;
pub mod chunking;

pub use cache::{load_index_json, save_index_json, CacheLoad};

/// Source of passages relevant to a query.
pub trait Retriever: Send + Sync {
    /// Return at most `k` passages ranked by similarity to `query`.
    /// An empty result means no grounding is available; it is not an error.
    fn get_relevant_chunks(&self, query: &str, k: usize) -> Result<Vec<String>, ChatError>;
}

/// A passage returned by a query, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// Passage stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedPassage {
    pub passage_id: u32,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Precomputed L2 norm of the embedding for fast cosine similarity computation.
    pub norm: f32,
}

pub struct KnowledgeIndex {
    pub(crate) source: String,
    pub(crate) passages: Vec<IndexedPassage>,
    pub(crate) corpus_fingerprint: String,
    pub(crate) min_score: f32,
    pub(crate) embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for KnowledgeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeIndex")
            .field("source", &self.source)
            .field("passages", &self.passages.len())
            .field("min_score", &self.min_score)
            .field("embedder", &self.embedder.id())
            .finish()
    }
}

/// blake3 digest of the corpus text, used to detect stale index caches.
pub fn corpus_fingerprint(corpus: &str) -> String {
    blake3::hash(corpus.as_bytes()).to_hex().to_string()
}

impl KnowledgeIndex {
    /// Read the corpus file in full and build the index from it.
    pub fn from_corpus_file(
        path: &Path,
        embedder: Arc<dyn Embedder>,
        config: &RetrievalConfig,
        progress: Option<ProgressCallback>,
    ) -> Result<Self, ChatError> {
        let corpus = std::fs::read_to_string(path).map_err(|e| {
            ChatError::RetrievalUnavailable(format!(
                "failed to read corpus '{}': {e}",
                path.display()
            ))
        })?;
        Self::build(&corpus, embedder, config, progress)
    }

    /// Split, embed and index `corpus`.
    pub fn build(
        corpus: &str,
        embedder: Arc<dyn Embedder>,
        config: &RetrievalConfig,
        progress: Option<ProgressCallback>,
    ) -> Result<Self, ChatError> {
        let start = Instant::now();
        let texts = chunking::split_passages(corpus, config.chunk_max_chars);
        if texts.is_empty() {
            return Err(ChatError::RetrievalUnavailable(
                "corpus contains no text".to_string(),
            ));
        }

        let embeddings = embedder
            .embed_batch(&texts, progress)
            .map_err(|e| ChatError::RetrievalUnavailable(format!("embedding corpus: {e:#}")))?;
        if embeddings.len() != texts.len() {
            return Err(ChatError::RetrievalUnavailable(format!(
                "embedder returned {} vectors for {} passages",
                embeddings.len(),
                texts.len()
            )));
        }

        let passages = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| IndexedPassage {
                passage_id: i as u32,
                norm: l2_norm(&embedding),
                text,
                embedding,
            })
            .collect::<Vec<_>>();

        info!(
            passages = passages.len(),
            embedder = embedder.id(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "knowledge index built"
        );

        Ok(Self {
            source: config.source_tag.clone(),
            passages,
            corpus_fingerprint: corpus_fingerprint(corpus),
            min_score: config.min_score,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn passages(&self) -> &[IndexedPassage] {
        &self.passages
    }

    /// Retrieve up to `k` passages scoring at least `min_score`, best first.
    pub fn retrieve_passages(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, ChatError> {
        let k = k.max(1);
        let query_emb = self
            .embedder
            .embed(query)
            .map_err(|e| ChatError::Retrieval(format!("embedding query: {e:#}")))?;
        let query_arr = ArrayView1::from(&query_emb[..]);
        let norm_q = l2_norm(&query_emb);

        let mut scored: Vec<(usize, f32)> = self
            .passages
            .par_iter()
            .enumerate()
            .map(|(i, p)| {
                let score = if p.norm == 0.0 || norm_q == 0.0 || p.embedding.len() != query_emb.len()
                {
                    0.0
                } else {
                    ArrayView1::from(&p.embedding[..]).dot(&query_arr) / (p.norm * norm_q)
                };
                (i, score)
            })
            .filter(|(_, score)| *score >= self.min_score)
            .collect();

        // Deterministic ordering: higher score first, then corpus order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);

        debug!(
            query,
            hits = scored.len(),
            top_score = scored.first().map(|s| s.1).unwrap_or(0.0),
            "retrieval"
        );

        Ok(scored
            .into_iter()
            .map(|(i, score)| RetrievedPassage {
                text: self.passages[i].text.clone(),
                source: self.source.clone(),
                score,
            })
            .collect())
    }
}

impl Retriever for KnowledgeIndex {
    fn get_relevant_chunks(&self, query: &str, k: usize) -> Result<Vec<String>, ChatError> {
        Ok(self
            .retrieve_passages(query, k)?
            .into_iter()
            .map(|p| p.text)
            .collect())
    }
}
