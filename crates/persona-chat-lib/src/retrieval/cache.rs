//! JSON persistence for a built `KnowledgeIndex`.
//!
//! The file stores passages and their embeddings plus enough provenance to
//! tell whether it still matches the corpus and the embedder. A cache that no
//! longer matches is reported as stale instead of silently reused.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{corpus_fingerprint, IndexedPassage, KnowledgeIndex};
use crate::config::RetrievalConfig;
use crate::embed::Embedder;

const FORMAT_VERSION: &str = "persona-chat-index-1";

/// Top-level serialisable index container.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableIndex {
    pub metadata: HashMap<String, String>,
    pub passages: Vec<IndexedPassage>,
}

/// Result of trying to load a cached index.
#[derive(Debug)]
pub enum CacheLoad {
    Fresh(KnowledgeIndex),
    /// The cache exists but was built from a different corpus, embedder or format.
    Stale { reason: String },
}

/// Save the index to a JSON file.
pub fn save_index_json(index: &KnowledgeIndex, path: &Path) -> Result<()> {
    let mut metadata = HashMap::new();
    metadata.insert("format_version".to_string(), FORMAT_VERSION.to_string());
    metadata.insert("source".to_string(), index.source.clone());
    metadata.insert("embedder".to_string(), index.embedder.id().to_string());
    metadata.insert(
        "corpus_fingerprint".to_string(),
        index.corpus_fingerprint.clone(),
    );

    let serial = SerializableIndex {
        metadata,
        passages: index.passages.clone(),
    };
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &serial)?;
    Ok(())
}

/// Load an index written by [`save_index_json`] if it still matches `corpus`
/// and `embedder`. The similarity threshold always comes from `config`, so it
/// can be tuned without rebuilding.
pub fn load_index_json(
    path: &Path,
    corpus: &str,
    embedder: Arc<dyn Embedder>,
    config: &RetrievalConfig,
) -> Result<CacheLoad> {
    let file = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
    let serial: SerializableIndex =
        serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))?;

    let meta = |key: &str| serial.metadata.get(key).map(String::as_str).unwrap_or("");

    if meta("format_version") != FORMAT_VERSION {
        return Ok(CacheLoad::Stale {
            reason: format!("unsupported format '{}'", meta("format_version")),
        });
    }
    if meta("embedder") != embedder.id() {
        return Ok(CacheLoad::Stale {
            reason: format!(
                "built with embedder '{}', current is '{}'",
                meta("embedder"),
                embedder.id()
            ),
        });
    }
    let fingerprint = corpus_fingerprint(corpus);
    if meta("corpus_fingerprint") != fingerprint {
        return Ok(CacheLoad::Stale {
            reason: "corpus changed since the index was built".to_string(),
        });
    }
    if serial.passages.is_empty() {
        return Ok(CacheLoad::Stale {
            reason: "cache holds no passages".to_string(),
        });
    }
    let dim = embedder.embed("")?.len();
    if let Some(p) = serial.passages.iter().find(|p| p.embedding.len() != dim) {
        return Ok(CacheLoad::Stale {
            reason: format!(
                "cached embeddings have {} dimensions, embedder produces {dim}",
                p.embedding.len()
            ),
        });
    }

    let source = match meta("source") {
        "" => config.source_tag.clone(),
        s => s.to_string(),
    };
    Ok(CacheLoad::Fresh(KnowledgeIndex {
        source,
        passages: serial.passages,
        corpus_fingerprint: fingerprint,
        min_score: config.min_score,
        embedder,
    }))
}
