//! Side-effecting actions the generation backend may request mid-completion.
//!
//! The set is closed: every capability is a variant of [`Capability`], parsed
//! from a [`ToolCall`] and run through the same `invoke` contract.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::contacts::ContactStore;
use crate::error::ChatError;
use crate::llm::ToolCall;
use crate::model::contact::{is_well_formed_email, ContactRecord};
use crate::model::recorded_emails::RecordedEmails;

pub const RECORD_CONTACT: &str = "record_contact";

/// Tool result sent back when an email was already on file.
pub const ALREADY_RECORDED_MESSAGE: &str =
    "Email recorded successfully, we will contact you shortly.";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordContactArgs {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    RecordContact(RecordContactArgs),
}

/// Outcome of one invocation, rendered into the tool result message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityResult {
    /// A new record was written.
    Recorded { email: String },
    /// The email was already known; nothing was written.
    AlreadyRecorded { email: String },
    /// The call could not be understood (unknown name, bad arguments).
    Rejected { reason: String },
}

impl CapabilityResult {
    pub fn to_tool_content(&self) -> String {
        match self {
            CapabilityResult::Recorded { .. } => json!({
                "status": "success",
                "message": "User details recorded successfully",
            })
            .to_string(),
            CapabilityResult::AlreadyRecorded { .. } => ALREADY_RECORDED_MESSAGE.to_string(),
            CapabilityResult::Rejected { reason } => json!({
                "status": "error",
                "message": reason,
            })
            .to_string(),
        }
    }
}

/// What `invoke` hands back: the result plus the session's recorded emails
/// after the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub result: CapabilityResult,
    pub recorded_emails: RecordedEmails,
}

impl Capability {
    /// Function-tool schemas for every capability, in chat-completions form.
    pub fn schemas() -> Vec<Value> {
        vec![json!({
            "type": "function",
            "function": {
                "name": RECORD_CONTACT,
                "description": "Use this tool to record that a user is interested in being in touch and provided an email address",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "email": {
                            "type": "string",
                            "description": "The email address of this user. Format should be similar to this: name@domain.com"
                        },
                        "name": {
                            "type": "string",
                            "description": "The user's name, if they provided it"
                        },
                        "notes": {
                            "type": "string",
                            "description": "Any additional information about the conversation that's worth recording to give context"
                        }
                    },
                    "required": ["email"],
                    "additionalProperties": false
                }
            }
        })]
    }

    /// Map a model tool call onto a capability.
    pub fn parse(call: &ToolCall) -> Result<Self, String> {
        match call.name.as_str() {
            RECORD_CONTACT => {
                let args: RecordContactArgs = serde_json::from_str(&call.arguments)
                    .map_err(|e| format!("invalid arguments for {RECORD_CONTACT}: {e}"))?;
                Ok(Capability::RecordContact(args))
            }
            other => Err(format!("unknown capability '{other}'")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Capability::RecordContact(_) => RECORD_CONTACT,
        }
    }

    /// Run the capability. Store failures are returned as errors; everything
    /// else becomes a [`CapabilityResult`].
    pub async fn invoke(
        &self,
        store: &dyn ContactStore,
        recorded: &RecordedEmails,
    ) -> Result<Invocation, ChatError> {
        match self {
            Capability::RecordContact(args) => record_contact(args, store, recorded).await,
        }
    }
}

async fn record_contact(
    args: &RecordContactArgs,
    store: &dyn ContactStore,
    recorded: &RecordedEmails,
) -> Result<Invocation, ChatError> {
    let email = args.email.as_str();

    if recorded.contains(email) {
        info!(email, "contact already recorded this session");
        return Ok(Invocation {
            result: CapabilityResult::AlreadyRecorded {
                email: email.to_string(),
            },
            recorded_emails: recorded.clone(),
        });
    }

    if store.get(email).await?.is_some() {
        info!(email, "contact already present in store");
        return Ok(Invocation {
            result: CapabilityResult::AlreadyRecorded {
                email: email.to_string(),
            },
            recorded_emails: recorded.with(email),
        });
    }

    if !is_well_formed_email(email) {
        warn!(email, "recording contact with a malformed email");
    }
    store
        .put(ContactRecord::new(email, args.name.clone(), args.notes.clone()))
        .await?;
    info!(email, "contact recorded");

    Ok(Invocation {
        result: CapabilityResult::Recorded {
            email: email.to_string(),
        },
        recorded_emails: recorded.with(email),
    })
}
