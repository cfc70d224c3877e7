use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Emails confirmed recorded during the current session.
///
/// Owned by the caller and threaded through each turn by value: components
/// receive `&RecordedEmails` and hand back a new, possibly larger, set.
/// Membership is exact string equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordedEmails(BTreeSet<String>);

impl RecordedEmails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, email: &str) -> bool {
        self.0.contains(email)
    }

    /// Return a copy of this set that also contains `email`.
    #[must_use]
    pub fn with(&self, email: &str) -> Self {
        let mut next = self.0.clone();
        next.insert(email.to_string());
        RecordedEmails(next)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for RecordedEmails {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        RecordedEmails(iter.into_iter().map(Into::into).collect())
    }
}
