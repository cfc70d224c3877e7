//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use persona_chat::error::{Service, ServiceErrorKind};
use persona_chat::llm::{Completion, CompletionRequest, TextCompletion, ToolCall};
use persona_chat::{
    ChatController, ChatError, ContactRecord, ContactStore, ControllerSettings, GeneratorSettings,
    InMemoryContactStore, QualityJudge, ResponseGenerator, Retriever,
};

/// Backend that replays a fixed script of completions and records every
/// request it receives.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Completion, ChatError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<Completion, ChatError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl TextCompletion for ScriptedBackend {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ChatError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(ChatError::external(
                Service::Generator,
                ServiceErrorKind::Unknown,
                "script exhausted",
            ))
        })
    }
}

/// Judge verdict as the backend would return it.
pub fn verdict(is_good: bool, feedback: &str) -> Result<Completion, ChatError> {
    Ok(Completion::text(
        serde_json::json!({"is_good_response": is_good, "feedback": feedback}).to_string(),
    ))
}

pub fn text(reply: &str) -> Result<Completion, ChatError> {
    Ok(Completion::text(reply))
}

pub fn record_contact_call(id: &str, email: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: "record_contact".to_string(),
        arguments: serde_json::json!({"email": email}).to_string(),
    }
}

pub fn tools(calls: Vec<ToolCall>) -> Result<Completion, ChatError> {
    Ok(Completion::tool_calls(calls))
}

/// Retriever that always returns the same passages and counts queries.
pub struct FixedRetriever {
    passages: Vec<String>,
    queries: AtomicUsize,
}

impl FixedRetriever {
    pub fn new(passages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            passages: passages.iter().map(|p| p.to_string()).collect(),
            queries: AtomicUsize::new(0),
        })
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Retriever for FixedRetriever {
    fn get_relevant_chunks(&self, _query: &str, k: usize) -> Result<Vec<String>, ChatError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.passages.iter().take(k).cloned().collect())
    }
}

/// In-memory store that also counts `put` calls.
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryContactStore,
    puts: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContactStore for CountingStore {
    async fn put(&self, record: ContactRecord) -> Result<(), ChatError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(record).await
    }

    async fn get(&self, email: &str) -> Result<Option<ContactRecord>, ChatError> {
        self.inner.get(email).await
    }
}

/// Store whose writes always fail.
pub struct BrokenStore;

#[async_trait]
impl ContactStore for BrokenStore {
    async fn put(&self, _record: ContactRecord) -> Result<(), ChatError> {
        Err(ChatError::ContactStore("disk full".into()))
    }

    async fn get(&self, _email: &str) -> Result<Option<ContactRecord>, ChatError> {
        Ok(None)
    }
}

pub fn generator(
    backend: Arc<ScriptedBackend>,
    store: Arc<dyn ContactStore>,
    max_capability_rounds: usize,
) -> ResponseGenerator {
    ResponseGenerator::new(
        backend,
        store,
        GeneratorSettings {
            persona_name: "Ada Lovelace".to_string(),
            max_tokens: 500,
            max_capability_rounds,
        },
    )
}

pub struct Harness {
    pub controller: ChatController,
    pub generator: Arc<ScriptedBackend>,
    pub judge: Arc<ScriptedBackend>,
    pub retriever: Arc<FixedRetriever>,
    pub store: Arc<CountingStore>,
}

pub fn harness(
    passages: &[&str],
    generator_script: Vec<Result<Completion, ChatError>>,
    judge_script: Vec<Result<Completion, ChatError>>,
    max_revisions: usize,
) -> Harness {
    let gen_backend = ScriptedBackend::new(generator_script);
    let judge_backend = ScriptedBackend::new(judge_script);
    let retriever = FixedRetriever::new(passages);
    let store = CountingStore::new();

    let controller = ChatController::new(
        retriever.clone(),
        generator(gen_backend.clone(), store.clone(), 8),
        QualityJudge::new(judge_backend.clone(), "Ada Lovelace"),
        ControllerSettings {
            top_k: 4,
            max_revisions,
        },
    );
    Harness {
        controller,
        generator: gen_backend,
        judge: judge_backend,
        retriever,
        store,
    }
}

/// Concatenated text of every message in a request.
pub fn request_text(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .filter_map(|m| m.content.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}
