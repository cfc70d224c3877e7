use serde::{Deserialize, Serialize};

/// Verdict returned by the quality judge for one reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Evaluation {
    pub is_good_response: bool,
    pub feedback: String,
}
