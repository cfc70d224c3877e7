use std::sync::Mutex;
use std::time::Instant;

use anyhow::{anyhow, Result};
use rust_embed::pool::{EmbeddingPool, ModelType, PoolConfig};
use tracing::info;

use super::Embedder;
use crate::utils::ProgressCallback;

// Chunk size for batch embedding; progress is reported once per chunk.
const BATCH_CHUNK: usize = 32;

/// MiniLM sentence embedder backed by a CPU worker pool.
pub struct MiniLmEmbedder {
    pool: Mutex<Option<EmbeddingPool>>,
}

impl MiniLmEmbedder {
    /// Start the pool.
    ///
    /// * `workers` - number of parallel worker threads (4 is a good default)
    /// * `cache_size` - cache entries per worker (0 disables caching)
    pub fn new(workers: usize, cache_size: usize) -> Result<Self> {
        let start = Instant::now();
        let config = PoolConfig {
            cpu_workers: workers.max(1),
            gpu_workers: 0,
            model: ModelType::MiniLM,
            cache_size_per_worker: cache_size,
            routing_config: None,
        };
        let pool = EmbeddingPool::new(config)?;
        info!(
            workers,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "MiniLM embedding pool initialized"
        );
        Ok(Self {
            pool: Mutex::new(Some(pool)),
        })
    }

    fn with_pool<T>(&self, f: impl FnOnce(&EmbeddingPool) -> Result<T>) -> Result<T> {
        let guard = self
            .pool
            .lock()
            .map_err(|_| anyhow!("embedding pool lock poisoned"))?;
        let pool = guard
            .as_ref()
            .ok_or_else(|| anyhow!("embedding pool already shut down"))?;
        f(pool)
    }
}

impl Embedder for MiniLmEmbedder {
    fn id(&self) -> &str {
        "minilm-l6-v2"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.with_pool(|pool| {
            let results = pool.embed_batch(vec![text.to_string()])?;
            results
                .into_iter()
                .next()
                .map(|arr| arr.to_vec())
                .ok_or_else(|| anyhow!("embedding pool returned no vector"))
        })
    }

    fn embed_batch(
        &self,
        texts: &[String],
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let total = texts.len();
        self.with_pool(|pool| {
            let mut out = Vec::with_capacity(total);
            for chunk in texts.chunks(BATCH_CHUNK) {
                let vectors = pool.embed_batch(chunk.to_vec())?;
                out.extend(vectors.into_iter().map(|arr| arr.to_vec()));
                if let Some(ref cb) = progress {
                    let fraction = (out.len().min(total) as f32) / (total as f32);
                    cb("Embedding".to_string(), fraction);
                }
            }
            Ok(out)
        })
    }

    fn shutdown(&self) -> Result<()> {
        let mut guard = self
            .pool
            .lock()
            .map_err(|_| anyhow!("embedding pool lock poisoned"))?;
        if let Some(pool) = guard.take() {
            pool.shutdown()?;
        }
        Ok(())
    }
}
