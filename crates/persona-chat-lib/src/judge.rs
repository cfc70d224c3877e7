//! Independent accept/reject gate for generated replies.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::ChatError;
use crate::llm::{ChatMessage, CompletionRequest, TextCompletion};
use crate::model::evaluation::Evaluation;
use crate::model::turn::Turn;
use crate::prompts;

pub struct QualityJudge {
    backend: Arc<dyn TextCompletion>,
    system_prompt: String,
}

impl QualityJudge {
    /// `persona_name` is the agent persona the judge is gating for.
    pub fn new(backend: Arc<dyn TextCompletion>, persona_name: &str) -> Self {
        Self {
            backend,
            system_prompt: prompts::judge_system_prompt(persona_name),
        }
    }

    /// Judge `reply` as an answer to `message` given `history`.
    ///
    /// Exactly one verdict per call. Anything that does not parse into an
    /// [`Evaluation`] fails with [`ChatError::MalformedJudgeOutput`].
    pub async fn evaluate(
        &self,
        reply: &str,
        message: &str,
        history: &[Turn],
    ) -> Result<Evaluation, ChatError> {
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(prompts::judge_user_prompt(reply, message, history)),
            ],
            tools: Vec::new(),
            max_tokens: None,
            response_format: Some(evaluation_format()),
        };
        let completion = self.backend.complete(&request).await?;
        let content = completion.content.ok_or_else(|| {
            ChatError::MalformedJudgeOutput("judge returned no content".to_string())
        })?;
        let evaluation = parse_evaluation(&content)?;
        debug!(
            accepted = evaluation.is_good_response,
            model = self.backend.model(),
            "judge verdict"
        );
        Ok(evaluation)
    }
}

/// Structured-output schema for the verdict.
fn evaluation_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "Evaluation",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "is_good_response": {"type": "boolean"},
                    "feedback": {"type": "string"}
                },
                "required": ["is_good_response", "feedback"],
                "additionalProperties": false
            }
        }
    })
}

/// Parse the judge's content. A surrounding markdown code fence is tolerated;
/// the object itself must match the schema exactly.
pub fn parse_evaluation(content: &str) -> Result<Evaluation, ChatError> {
    let body = strip_code_fence(content.trim());
    serde_json::from_str::<Evaluation>(body).map_err(|e| {
        let preview: String = content.chars().take(200).collect();
        ChatError::MalformedJudgeOutput(format!("{e}; content: {preview}"))
    })
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
