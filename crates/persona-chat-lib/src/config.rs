//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then an optional JSON file, then API
//! keys from the environment, then whatever the CLI overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

pub const DEFAULT_PERSONA: &str = "Diego Araque";

/// Connection settings for one OpenAI-compatible completion backend.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BackendConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Resolved key. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-call timeout in seconds.
    pub request_timeout_secs: u64,
}

impl BackendConfig {
    pub fn generator_default() -> Self {
        BackendConfig {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            request_timeout_secs: 60,
        }
    }

    pub fn judge_default() -> Self {
        BackendConfig {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            api_key: None,
            request_timeout_secs: 60,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    fn resolve_key_from_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var(&self.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
    }
}

/// Field-by-field overrides for a backend as read from a config file, so a
/// partial `judge` section keeps the judge's own defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BackendPatch {
    base_url: Option<String>,
    model: Option<String>,
    api_key_env: Option<String>,
    api_key: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl BackendPatch {
    fn apply(self, mut base: BackendConfig) -> BackendConfig {
        if let Some(v) = self.base_url {
            base.base_url = v;
        }
        if let Some(v) = self.model {
            base.model = v;
        }
        if let Some(v) = self.api_key_env {
            base.api_key_env = v;
        }
        if self.api_key.is_some() {
            base.api_key = self.api_key;
        }
        if let Some(v) = self.request_timeout_secs {
            base.request_timeout_secs = v;
        }
        base
    }
}

/// Retrieval index settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Passages returned per query.
    pub top_k: usize,
    /// Passages scoring below this cosine similarity are never returned.
    pub min_score: f32,
    /// Upper bound on passage length when splitting the corpus.
    pub chunk_max_chars: usize,
    /// Tag attached to every passage from the corpus.
    pub source_tag: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            top_k: 4,
            min_score: 0.2,
            chunk_max_chars: 800,
            source_tag: "knowledge_base".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawChatConfig")]
pub struct ChatConfig {
    /// Person the assistant speaks for.
    pub persona_name: String,
    pub generator: BackendConfig,
    pub judge: BackendConfig,
    pub retrieval: RetrievalConfig,
    /// Revision rounds allowed after the first rejected reply.
    pub max_revisions: usize,
    /// Capability round-trips allowed within one generation.
    pub max_capability_rounds: usize,
    /// Completion length cap for the generator.
    pub max_tokens: u32,
    pub corpus_path: PathBuf,
    pub contacts_path: PathBuf,
    pub index_cache_path: Option<PathBuf>,
    /// MiniLM worker threads.
    pub embed_workers: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            persona_name: DEFAULT_PERSONA.to_string(),
            generator: BackendConfig::generator_default(),
            judge: BackendConfig::judge_default(),
            retrieval: RetrievalConfig::default(),
            max_revisions: 3,
            max_capability_rounds: 8,
            max_tokens: 500,
            corpus_path: PathBuf::from("knowledge/knowledge_base.txt"),
            contacts_path: PathBuf::from("contacts.json"),
            index_cache_path: None,
            embed_workers: 4,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawChatConfig {
    persona_name: Option<String>,
    generator: BackendPatch,
    judge: BackendPatch,
    retrieval: RetrievalConfig,
    max_revisions: Option<usize>,
    max_capability_rounds: Option<usize>,
    max_tokens: Option<u32>,
    corpus_path: Option<PathBuf>,
    contacts_path: Option<PathBuf>,
    index_cache_path: Option<PathBuf>,
    embed_workers: Option<usize>,
}

impl From<RawChatConfig> for ChatConfig {
    fn from(raw: RawChatConfig) -> Self {
        let d = ChatConfig::default();
        ChatConfig {
            persona_name: raw.persona_name.unwrap_or(d.persona_name),
            generator: raw.generator.apply(d.generator),
            judge: raw.judge.apply(d.judge),
            retrieval: raw.retrieval,
            max_revisions: raw.max_revisions.unwrap_or(d.max_revisions),
            max_capability_rounds: raw.max_capability_rounds.unwrap_or(d.max_capability_rounds),
            max_tokens: raw.max_tokens.unwrap_or(d.max_tokens),
            corpus_path: raw.corpus_path.unwrap_or(d.corpus_path),
            contacts_path: raw.contacts_path.unwrap_or(d.contacts_path),
            index_cache_path: raw.index_cache_path,
            embed_workers: raw.embed_workers.unwrap_or(d.embed_workers),
        }
    }
}

impl ChatConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ChatError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ChatError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Fill API keys that were not set explicitly from their environment variables.
    pub fn resolve_env(&mut self) {
        self.generator.resolve_key_from_env();
        self.judge.resolve_key_from_env();
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.persona_name.trim().is_empty() {
            return Err(ChatError::Config("persona_name must not be empty".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(ChatError::Config("retrieval.top_k must be at least 1".into()));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(ChatError::Config(format!(
                "retrieval.min_score must be within [-1, 1], got {}",
                self.retrieval.min_score
            )));
        }
        if self.retrieval.chunk_max_chars == 0 {
            return Err(ChatError::Config(
                "retrieval.chunk_max_chars must be at least 1".into(),
            ));
        }
        for (name, backend) in [("generator", &self.generator), ("judge", &self.judge)] {
            if backend.model.trim().is_empty() {
                return Err(ChatError::Config(format!("{name}.model must not be empty")));
            }
            if backend.base_url.trim().is_empty() {
                return Err(ChatError::Config(format!("{name}.base_url must not be empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = ChatConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.max_revisions, 3);
        assert_eq!(cfg.retrieval.top_k, 4);
        assert_eq!(cfg.judge.model, "gemini-2.0-flash");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"persona_name":"Ada Lovelace","retrieval":{"top_k":2},"judge":{"model":"judge-x"}}"#,
        )
        .unwrap();
        let cfg = ChatConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.persona_name, "Ada Lovelace");
        assert_eq!(cfg.retrieval.top_k, 2);
        assert_eq!(cfg.retrieval.min_score, 0.2);
        assert_eq!(cfg.judge.model, "judge-x");
        assert_eq!(cfg.judge.base_url, BackendConfig::judge_default().base_url);
        assert_eq!(cfg.generator, BackendConfig::generator_default());
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        std::fs::write(&path, r#"{"max_revision": 1}"#).unwrap();
        match ChatConfig::from_json_file(&path) {
            Err(ChatError::Config(msg)) => assert!(msg.contains("max_revision"), "{msg}"),
            other => panic!("expected a config error, got {other:?}"),
        }

        std::fs::write(&path, r#"{"retrieval":{"topk": 2}}"#).unwrap();
        assert!(matches!(
            ChatConfig::from_json_file(&path),
            Err(ChatError::Config(_))
        ));

        let written = serde_json::to_string(&ChatConfig::default()).unwrap();
        std::fs::write(&path, written).unwrap();
        assert_eq!(ChatConfig::from_json_file(&path).unwrap(), ChatConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = ChatConfig::default();
        cfg.retrieval.top_k = 0;
        assert!(matches!(cfg.validate(), Err(ChatError::Config(_))));

        let mut cfg = ChatConfig::default();
        cfg.retrieval.min_score = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = ChatConfig::default();
        cfg.generator.model = " ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn api_keys_are_not_serialized() {
        let mut cfg = ChatConfig::default();
        cfg.generator.api_key = Some("sk-secret".into());
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
