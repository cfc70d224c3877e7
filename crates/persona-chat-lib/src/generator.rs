//! Persona reply generation with capability dispatch.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::capability::{Capability, CapabilityResult};
use crate::contacts::ContactStore;
use crate::error::{ChatError, Service, ServiceErrorKind};
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, TextCompletion};
use crate::model::recorded_emails::RecordedEmails;
use crate::model::turn::Turn;
use crate::prompts;

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub persona_name: String,
    pub max_tokens: u32,
    /// Capability round-trips per generation before the model is asked to
    /// answer without tools.
    pub max_capability_rounds: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            persona_name: crate::config::DEFAULT_PERSONA.to_string(),
            max_tokens: 500,
            max_capability_rounds: 8,
        }
    }
}

/// Text of a generated reply together with the session's recorded emails
/// after any capability invocations it triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    pub reply: String,
    pub recorded_emails: RecordedEmails,
}

pub struct ResponseGenerator {
    backend: Arc<dyn TextCompletion>,
    store: Arc<dyn ContactStore>,
    system_prompt: String,
    settings: GeneratorSettings,
}

impl ResponseGenerator {
    pub fn new(
        backend: Arc<dyn TextCompletion>,
        store: Arc<dyn ContactStore>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            system_prompt: prompts::persona_system_prompt(&settings.persona_name),
            backend,
            store,
            settings,
        }
    }

    /// Answer `message` grounded in `passages`.
    ///
    /// An empty `passages` slice is stated explicitly in the prompt so the
    /// model declines instead of inventing an answer.
    pub async fn generate(
        &self,
        message: &str,
        history: &[Turn],
        recorded_emails: &RecordedEmails,
        passages: &[String],
    ) -> Result<GeneratedReply, ChatError> {
        let user = prompts::grounded_message(message, passages);
        self.run(history, user, recorded_emails).await
    }

    /// Produce a new reply that addresses the judge's `feedback`.
    ///
    /// Capability calls are honored here too, with the same bookkeeping, so an
    /// email volunteered during a revision is still recorded at most once.
    pub async fn revise(
        &self,
        previous_reply: &str,
        message: &str,
        history: &[Turn],
        feedback: &str,
        recorded_emails: &RecordedEmails,
    ) -> Result<GeneratedReply, ChatError> {
        let user = prompts::revision_message(previous_reply, message, history, feedback);
        self.run(history, user, recorded_emails).await
    }

    async fn run(
        &self,
        history: &[Turn],
        user_message: String,
        recorded_emails: &RecordedEmails,
    ) -> Result<GeneratedReply, ChatError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(user_message));

        let mut request = CompletionRequest {
            messages,
            tools: Capability::schemas(),
            max_tokens: Some(self.settings.max_tokens),
            response_format: None,
        };
        let mut recorded = recorded_emails.clone();
        let mut rounds = 0usize;

        loop {
            if rounds >= self.settings.max_capability_rounds && !request.tools.is_empty() {
                warn!(rounds, "capability round limit reached; requesting a text answer");
                request.tools.clear();
            }

            let completion = self.backend.complete(&request).await?;

            if completion.wants_tools() && !request.tools.is_empty() {
                rounds += 1;
                debug!(
                    round = rounds,
                    calls = completion.tool_calls.len(),
                    "completion requested capabilities"
                );
                request.messages.push(ChatMessage::assistant_tool_calls(
                    completion.content.clone(),
                    completion.tool_calls.clone(),
                ));
                for call in &completion.tool_calls {
                    let result = match Capability::parse(call) {
                        Ok(capability) => {
                            let invocation =
                                capability.invoke(self.store.as_ref(), &recorded).await?;
                            recorded = invocation.recorded_emails;
                            invocation.result
                        }
                        Err(reason) => {
                            warn!(call_id = %call.id, tool = %call.name, %reason, "rejected capability call");
                            CapabilityResult::Rejected { reason }
                        }
                    };
                    request
                        .messages
                        .push(ChatMessage::tool_result(call.id.clone(), result.to_tool_content()));
                }
                continue;
            }

            if completion.wants_tools() {
                warn!("ignoring capability calls made without tools on offer");
            }
            if completion.finish_reason == FinishReason::Length {
                warn!(
                    max_tokens = self.settings.max_tokens,
                    "reply truncated at max_tokens"
                );
            }

            let reply = completion
                .content
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| {
                    ChatError::external(
                        Service::Generator,
                        ServiceErrorKind::EmptyResponse,
                        "completion finished without text",
                    )
                })?;
            return Ok(GeneratedReply {
                reply,
                recorded_emails: recorded,
            });
        }
    }
}
