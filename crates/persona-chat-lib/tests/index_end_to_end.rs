mod common;

use std::sync::Arc;

use anyhow::Result;
use common::*;
use persona_chat::config::RetrievalConfig;
use persona_chat::embed::{Embedder, HashingEmbedder};
use persona_chat::prompts::NO_INFORMATION_MARKER;
use persona_chat::retrieval::{load_index_json, save_index_json, CacheLoad};
use persona_chat::{
    ChatController, ControllerSettings, KnowledgeIndex, QualityJudge, RecordedEmails, ReplyOutcome,
};

const CORPUS: &str = "\
Ada Lovelace works as a senior data engineer at Analytical Engines Ltd.

She holds a degree in mathematics from the University of London.

Her side project is a notation for describing loops on mechanical computers.
";

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::with_dim(8192))
}

fn config() -> RetrievalConfig {
    RetrievalConfig {
        min_score: 0.15,
        ..RetrievalConfig::default()
    }
}

/// The cached index answers exactly like the freshly built one.
#[test]
fn cached_index_matches_fresh_index() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let corpus_path = dir.path().join("knowledge.txt");
    let cache_path = dir.path().join("index.json");
    std::fs::write(&corpus_path, CORPUS)?;

    let fresh = KnowledgeIndex::from_corpus_file(&corpus_path, embedder(), &config(), None)?;
    save_index_json(&fresh, &cache_path)?;

    let loaded = match load_index_json(&cache_path, CORPUS, embedder(), &config())? {
        CacheLoad::Fresh(index) => index,
        CacheLoad::Stale { reason } => panic!("unexpectedly stale: {reason}"),
    };

    let query = "Where did Ada study mathematics?";
    let a = fresh.retrieve_passages(query, 4)?;
    let b = loaded.retrieve_passages(query, 4)?;
    assert_eq!(a, b);
    assert!(a[0].text.contains("University of London"));

    let edited = format!("{CORPUS}\nShe also plays the harp.\n");
    assert!(matches!(
        load_index_json(&cache_path, &edited, embedder(), &config())?,
        CacheLoad::Stale { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn controller_grounds_generation_in_retrieved_passages() -> Result<()> {
    let index = Arc::new(KnowledgeIndex::build(CORPUS, embedder(), &config(), None)?);
    let gen_backend = ScriptedBackend::new(vec![
        text("I studied mathematics at the University of London."),
        text(persona_chat::prompts::NOT_ENOUGH_INFORMATION),
    ]);
    let judge_backend = ScriptedBackend::new(vec![verdict(true, "ok"), verdict(true, "ok")]);
    let controller = ChatController::new(
        index,
        generator(gen_backend.clone(), CountingStore::new(), 8),
        QualityJudge::new(judge_backend, "Ada Lovelace"),
        ControllerSettings::default(),
    );

    let reply = controller
        .respond("Where did you study mathematics?", &[], &RecordedEmails::new())
        .await?;
    assert_eq!(reply.outcome, ReplyOutcome::Accepted { revisions: 0 });
    let grounded = request_text(&gen_backend.requests()[0]);
    assert!(grounded.contains("University of London"));

    controller
        .respond("What is your favourite banana smoothie?", &[], &RecordedEmails::new())
        .await?;
    let ungrounded = request_text(&gen_backend.requests()[1]);
    assert!(ungrounded.contains(NO_INFORMATION_MARKER));
    Ok(())
}
