//! Library entry point for the persona chat assistant.
//!
//! A single user message flows through [`ChatController::respond`]: passages
//! are retrieved from the persona's corpus, a reply is generated (recording
//! contact details when the model asks to), and an independent judge accepts
//! the reply or sends it back for a bounded number of revisions.
//!
//! [`build_controller`] wires the production components from a [`ChatConfig`].
//
// Public modules
pub mod capability;
pub mod config;
pub mod contacts;
pub mod embed;
pub mod error;
pub mod generator;
pub mod judge;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod prompts;
pub mod retrieval;
pub mod utils;

// Re-export primary types for ergonomic use.
pub use config::ChatConfig;
pub use contacts::{ContactStore, InMemoryContactStore, JsonFileContactStore};
pub use error::ChatError;
pub use generator::{GeneratedReply, GeneratorSettings, ResponseGenerator};
pub use judge::QualityJudge;
pub use llm::TextCompletion;
pub use model::{
    contact::ContactRecord,
    evaluation::Evaluation,
    recorded_emails::RecordedEmails,
    turn::{Role, Turn},
};
pub use orchestrator::{ChatController, ChatReply, ControllerSettings, ReplyOutcome};
pub use retrieval::{KnowledgeIndex, RetrievedPassage, Retriever};

use std::sync::Arc;

use error::Service;
use llm::OpenAiCompatibleClient;

/// Wire a controller from configuration and already-built leaf components.
///
/// The generator and the judge each get their own HTTP client, so they can
/// point at different providers.
pub fn build_controller(
    config: &ChatConfig,
    retriever: Arc<dyn Retriever>,
    store: Arc<dyn ContactStore>,
) -> Result<ChatController, ChatError> {
    config.validate()?;
    let generator_backend: Arc<dyn TextCompletion> = Arc::new(OpenAiCompatibleClient::new(
        Service::Generator,
        &config.generator,
    )?);
    let judge_backend: Arc<dyn TextCompletion> =
        Arc::new(OpenAiCompatibleClient::new(Service::Judge, &config.judge)?);

    let generator = ResponseGenerator::new(
        generator_backend,
        store,
        GeneratorSettings {
            persona_name: config.persona_name.clone(),
            max_tokens: config.max_tokens,
            max_capability_rounds: config.max_capability_rounds,
        },
    );
    let judge = QualityJudge::new(judge_backend, &config.persona_name);

    Ok(ChatController::new(
        retriever,
        generator,
        judge,
        ControllerSettings {
            top_k: config.retrieval.top_k,
            max_revisions: config.max_revisions,
        },
    ))
}
