/*
Embedder selection:

- `minilm` (default feature): the MiniLM pool from `rust_embed`, parallel CPU
  workers with an optional per-worker cache.
- `HashingEmbedder`: a deterministic bag-of-words embedder that needs no model
  assets. It is always compiled so tests can construct it directly, and
  `default_embedder` falls back to it when `minilm` is disabled or
  `fake-embed` is enabled.

The retrieval index only ever sees `Arc<dyn Embedder>`.
*/

use std::sync::Arc;

use anyhow::Result;

use crate::utils::ProgressCallback;

mod hashing;
#[cfg(all(feature = "minilm", not(feature = "fake-embed")))]
mod minilm;

pub use hashing::HashingEmbedder;
#[cfg(all(feature = "minilm", not(feature = "fake-embed")))]
pub use minilm::MiniLmEmbedder;

/// Text to vector function used by the retrieval index.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model; persisted in index caches so vectors
    /// from different models are never mixed.
    fn id(&self) -> &str;

    /// Embed a single piece of text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, reporting progress as a fraction in 0.0..1.0.
    fn embed_batch(
        &self,
        texts: &[String],
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<Vec<f32>>> {
        let total = texts.len();
        let mut out = Vec::with_capacity(total);
        for (idx, t) in texts.iter().enumerate() {
            out.push(self.embed(t)?);
            if let Some(ref cb) = progress {
                cb(
                    format!("Embedding {}/{}", idx + 1, total),
                    (idx + 1) as f32 / total as f32,
                );
            }
        }
        Ok(out)
    }

    /// Release worker resources. Default is a no-op.
    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Build the embedder selected at compile time.
///
/// * `workers` - number of parallel embedding workers (MiniLM only)
/// * `cache_size` - cache entries per worker (MiniLM only)
#[cfg(all(feature = "minilm", not(feature = "fake-embed")))]
pub fn default_embedder(workers: usize, cache_size: usize) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(MiniLmEmbedder::new(workers, cache_size)?))
}

#[cfg(not(all(feature = "minilm", not(feature = "fake-embed"))))]
pub fn default_embedder(_workers: usize, _cache_size: usize) -> Result<Arc<dyn Embedder>> {
    tracing::warn!("MiniLM embedder not compiled in; using the hashing embedder");
    Ok(Arc::new(HashingEmbedder::default()))
}
