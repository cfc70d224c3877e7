//! Error kinds surfaced by the chat core.
//!
//! Leaf components return `ChatError` directly and the orchestrator passes
//! them through untouched, so a turn either completes with a reply or fails
//! as a whole.

use std::fmt;

use thiserror::Error;

/// Which completion backend produced an [`ChatError::ExternalService`] error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Generator,
    Judge,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Generator => write!(f, "generator"),
            Service::Judge => write!(f, "judge"),
        }
    }
}

/// Classification of a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// 401/403: bad API key or permissions.
    Auth,
    /// 429: rate limited or quota exhausted.
    RateLimit,
    /// 408 or the per-call timeout elapsed.
    Timeout,
    /// Connection refused, DNS failure, reset.
    Network,
    /// 5xx from the provider.
    Server,
    /// The completion finished without any text.
    EmptyResponse,
    /// The response body did not have the expected shape.
    Protocol,
    /// Anything else.
    Unknown,
}

impl ServiceErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ServiceErrorKind::Auth,
            402 | 429 => ServiceErrorKind::RateLimit,
            408 => ServiceErrorKind::Timeout,
            500..=599 => ServiceErrorKind::Server,
            _ => ServiceErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceErrorKind::Auth => "auth",
            ServiceErrorKind::RateLimit => "rate_limit",
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::Network => "network",
            ServiceErrorKind::Server => "server",
            ServiceErrorKind::EmptyResponse => "empty_response",
            ServiceErrorKind::Protocol => "protocol",
            ServiceErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    /// The corpus or its index could not be built. Fatal at startup.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Searching an already-built index failed for one query. Only the turn is lost.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// A generation or judgment backend call failed. Not retried.
    #[error("{service} backend failed ({kind}{}): {message}", fmt_status(.status))]
    ExternalService {
        service: Service,
        kind: ServiceErrorKind,
        status: Option<u16>,
        message: String,
    },

    /// The judge answered with something that is not a verdict.
    #[error("malformed judge output: {0}")]
    MalformedJudgeOutput(String),

    #[error("contact store error: {0}")]
    ContactStore(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ChatError {
    pub fn external(service: Service, kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        ChatError::ExternalService {
            service,
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_reqwest(service: Service, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ServiceErrorKind::Timeout
        } else if err.is_connect() || err.is_request() {
            ServiceErrorKind::Network
        } else if err.is_decode() {
            ServiceErrorKind::Protocol
        } else {
            ServiceErrorKind::Unknown
        };
        ChatError::ExternalService {
            service,
            kind,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    /// Classify a non-success HTTP status with its (truncated) body.
    pub fn from_status(service: Service, status: u16, body: &str) -> Self {
        ChatError::ExternalService {
            service,
            kind: ServiceErrorKind::from_status(status),
            status: Some(status),
            message: truncate_body(body),
        }
    }

    /// User-facing text for the UI layer. The session stays usable after any
    /// of these; only the current turn is lost.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::ExternalService { kind, .. } => match kind {
                ServiceErrorKind::Auth => {
                    "The assistant is misconfigured (authentication failed). Please try again later."
                        .to_string()
                }
                ServiceErrorKind::RateLimit => {
                    "The assistant is receiving too many requests right now. Please try again in a moment."
                        .to_string()
                }
                ServiceErrorKind::Timeout => {
                    "The assistant took too long to answer. Please try again.".to_string()
                }
                _ => "The assistant could not answer right now. Please try again.".to_string(),
            },
            ChatError::MalformedJudgeOutput(_) => {
                "The assistant could not verify its answer. Please try again.".to_string()
            }
            ChatError::Retrieval(_) => {
                "The assistant could not search its notes right now. Please try again.".to_string()
            }
            ChatError::ContactStore(_) => {
                "Your details could not be saved right now. Please try again.".to_string()
            }
            ChatError::RetrievalUnavailable(_) | ChatError::Config(_) => {
                "The assistant is unavailable.".to_string()
            }
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(", status {s}")).unwrap_or_default()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
