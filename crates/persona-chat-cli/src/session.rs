use persona_chat::{ChatReply, RecordedEmails, Turn};

/// One line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Input {
    Quit,
    Reset,
    Blank,
    Message(String),
}

pub(crate) fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    match trimmed {
        "" => Input::Blank,
        "/quit" | "/exit" => Input::Quit,
        "/reset" => Input::Reset,
        _ => Input::Message(trimmed.to_string()),
    }
}

/// UI-side session state: the visible history and the emails recorded so far.
#[derive(Debug, Default)]
pub(crate) struct Session {
    history: Vec<Turn>,
    recorded_emails: RecordedEmails,
}

impl Session {
    pub(crate) fn history(&self) -> &[Turn] {
        &self.history
    }

    pub(crate) fn recorded_emails(&self) -> &RecordedEmails {
        &self.recorded_emails
    }

    /// Append a completed exchange and adopt the reply's recorded emails.
    pub(crate) fn commit(&mut self, message: &str, reply: &ChatReply) {
        self.history.push(Turn::user(message));
        self.history.push(Turn::assistant(reply.reply.clone()));
        self.recorded_emails = reply.recorded_emails.clone();
    }

    pub(crate) fn reset(&mut self) {
        *self = Session::default();
    }
}
