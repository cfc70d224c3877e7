use anyhow::Result;

use super::Embedder;

// Wide enough that bucket collisions between unrelated short texts are rare.
const HASHING_DIM: usize = 1024;

/// Words that carry no topical signal and would otherwise dominate the overlap.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "has",
    "have", "he", "her", "his", "how", "i", "in", "is", "it", "me", "my", "of", "on", "or",
    "she", "that", "the", "their", "this", "to", "was", "what", "when", "where", "which", "who",
    "with", "you", "your",
];

/// Deterministic feature-hashing embedder.
///
/// Each lowercased alphanumeric token (minus stopwords) is hashed into one of
/// `dim` buckets with a hashed sign. Texts sharing vocabulary get a positive
/// cosine similarity and texts with no overlap score exactly zero, which makes
/// retrieval thresholds behave predictably in tests.
///
/// Buckets come from blake3 and do not change between builds. The id names
/// the dimension.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::with_dim(HASHING_DIM)
    }
}

impl HashingEmbedder {
    pub fn with_dim(dim: usize) -> Self {
        let dim = dim.max(1);
        HashingEmbedder {
            dim,
            id: format!("hashing-bow-{dim}"),
        }
    }

    fn token_hash(token: &str) -> u64 {
        let digest = blake3::hash(token.as_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(word)
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
    }
}

impl Embedder for HashingEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = vec![0.0_f32; self.dim];
        for token in Self::tokens(text) {
            let h = Self::token_hash(&token);
            let bucket = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            out[bucket] += sign;
        }
        Ok(out)
    }
}
