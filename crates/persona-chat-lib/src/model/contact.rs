use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("static email regex")
});

/// Contact details volunteered by a user. Identity is the exact email string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ContactRecord {
    pub fn new(email: impl Into<String>, name: Option<String>, notes: Option<String>) -> Self {
        ContactRecord {
            email: email.into(),
            name: name.filter(|n| !n.trim().is_empty()),
            notes: notes.filter(|n| !n.trim().is_empty()),
            recorded_at: Utc::now(),
        }
    }

    /// Whether the email looks like `name@domain.tld`. Advisory only: the
    /// persona prompt owns validation and malformed addresses are still stored.
    pub fn is_well_formed(&self) -> bool {
        is_well_formed_email(&self.email)
    }
}

pub fn is_well_formed_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(is_well_formed_email("a@b.com"));
        assert!(is_well_formed_email("first.last+tag@sub.example.org"));
        assert!(!is_well_formed_email("not-an-email"));
        assert!(!is_well_formed_email("a@b"));
        assert!(!is_well_formed_email("a b@c.com"));
    }

    #[test]
    fn blank_optionals_are_dropped() {
        let rec = ContactRecord::new("a@b.com", Some("  ".into()), Some("wants a CV".into()));
        assert_eq!(rec.name, None);
        assert_eq!(rec.notes.as_deref(), Some("wants a CV"));
        assert!(rec.is_well_formed());
    }
}
