//! Per-message control loop: retrieve, generate, judge, revise.
//!
//! Each call to [`ChatController::respond`] walks an explicit state machine
//! that terminates either in `Accepted` or, once the revision budget is spent,
//! in `GaveUp`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ChatError;
use crate::generator::{GeneratedReply, ResponseGenerator};
use crate::judge::QualityJudge;
use crate::model::recorded_emails::RecordedEmails;
use crate::model::turn::Turn;
use crate::retrieval::Retriever;

/// Appended to the last reply when the judge never accepted one.
pub const GIVE_UP_DISCLAIMER: &str = "_Note: I could not fully verify this answer. \
Please double-check the details, or leave your email so I can follow up directly._";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Passages requested from the retriever.
    pub top_k: usize,
    /// Revision rounds allowed after the first rejection.
    pub max_revisions: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        ControllerSettings {
            top_k: 4,
            max_revisions: 3,
        }
    }
}

/// How the turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyOutcome {
    /// The judge accepted the reply after `revisions` revision rounds.
    Accepted { revisions: usize },
    /// The judge rejected every reply; the last one is returned with a disclaimer.
    GaveUp { revisions: usize },
}

impl ReplyOutcome {
    pub fn revisions(&self) -> usize {
        match self {
            ReplyOutcome::Accepted { revisions } | ReplyOutcome::GaveUp { revisions } => *revisions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub recorded_emails: RecordedEmails,
    pub outcome: ReplyOutcome,
}

enum Stage {
    Retrieve,
    Generate {
        passages: Vec<String>,
    },
    Evaluate {
        draft: GeneratedReply,
        revisions: usize,
    },
    Revise {
        draft: GeneratedReply,
        feedback: String,
        revisions: usize,
    },
    Accept {
        draft: GeneratedReply,
        revisions: usize,
    },
    GiveUp {
        draft: GeneratedReply,
        revisions: usize,
    },
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Retrieve => "retrieve",
            Stage::Generate { .. } => "generate",
            Stage::Evaluate { .. } => "evaluate",
            Stage::Revise { .. } => "revise",
            Stage::Accept { .. } => "accept",
            Stage::GiveUp { .. } => "give_up",
        }
    }
}

pub struct ChatController {
    retriever: Arc<dyn Retriever>,
    generator: ResponseGenerator,
    judge: QualityJudge,
    settings: ControllerSettings,
}

impl ChatController {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: ResponseGenerator,
        judge: QualityJudge,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            retriever,
            generator,
            judge,
            settings,
        }
    }

    pub fn settings(&self) -> ControllerSettings {
        self.settings
    }

    /// Answer one user message.
    ///
    /// `history` holds the turns before `message`; `recorded_emails` is the
    /// session's set going in, and the returned [`ChatReply`] carries the set
    /// coming out. Errors from any component end the turn unchanged.
    pub async fn respond(
        &self,
        message: &str,
        history: &[Turn],
        recorded_emails: &RecordedEmails,
    ) -> Result<ChatReply, ChatError> {
        let mut stage = Stage::Retrieve;
        loop {
            debug!(stage = stage.name(), "orchestrator stage");
            stage = match stage {
                Stage::Retrieve => {
                    let passages = self
                        .retriever
                        .get_relevant_chunks(message, self.settings.top_k)?;
                    debug!(passages = passages.len(), "retrieved");
                    Stage::Generate { passages }
                }
                Stage::Generate { passages } => {
                    let draft = self
                        .generator
                        .generate(message, history, recorded_emails, &passages)
                        .await?;
                    Stage::Evaluate {
                        draft,
                        revisions: 0,
                    }
                }
                Stage::Evaluate { draft, revisions } => {
                    let evaluation = self.judge.evaluate(&draft.reply, message, history).await?;
                    if evaluation.is_good_response {
                        Stage::Accept { draft, revisions }
                    } else if revisions < self.settings.max_revisions {
                        debug!(revisions, feedback = %evaluation.feedback, "reply rejected");
                        Stage::Revise {
                            draft,
                            feedback: evaluation.feedback,
                            revisions,
                        }
                    } else {
                        Stage::GiveUp { draft, revisions }
                    }
                }
                Stage::Revise {
                    draft,
                    feedback,
                    revisions,
                } => {
                    let revised = self
                        .generator
                        .revise(
                            &draft.reply,
                            message,
                            history,
                            &feedback,
                            &draft.recorded_emails,
                        )
                        .await?;
                    Stage::Evaluate {
                        draft: revised,
                        revisions: revisions + 1,
                    }
                }
                Stage::Accept { draft, revisions } => {
                    info!(revisions, "reply accepted");
                    return Ok(ChatReply {
                        reply: draft.reply,
                        recorded_emails: draft.recorded_emails,
                        outcome: ReplyOutcome::Accepted { revisions },
                    });
                }
                Stage::GiveUp { draft, revisions } => {
                    info!(revisions, "revision budget exhausted; returning last reply");
                    return Ok(ChatReply {
                        reply: format!("{}\n\n{}", draft.reply, GIVE_UP_DISCLAIMER),
                        recorded_emails: draft.recorded_emails,
                        outcome: ReplyOutcome::GaveUp { revisions },
                    });
                }
            };
        }
    }
}
