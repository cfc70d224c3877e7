pub mod contact;
pub mod evaluation;
pub mod recorded_emails;
pub mod turn;
