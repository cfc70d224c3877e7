mod common;

use common::*;
use persona_chat::error::{Service, ServiceErrorKind};
use persona_chat::llm::MessageRole;
use persona_chat::orchestrator::GIVE_UP_DISCLAIMER;
use persona_chat::prompts::{NOT_ENOUGH_INFORMATION, NO_INFORMATION_MARKER};
use persona_chat::{ChatError, RecordedEmails, ReplyOutcome, Turn};

const WORK_PASSAGE: &str =
    "Ada works as a senior data engineer at Analytical Engines Ltd, building pipelines in Rust.";

#[tokio::test]
async fn accepted_first_time_carries_passage_information() {
    let h = harness(
        &[WORK_PASSAGE],
        vec![text("I work as a senior data engineer at Analytical Engines Ltd.")],
        vec![verdict(true, "accurate")],
        3,
    );

    let reply = h
        .controller
        .respond("What do you do for work?", &[], &RecordedEmails::new())
        .await
        .unwrap();

    assert_eq!(reply.outcome, ReplyOutcome::Accepted { revisions: 0 });
    assert!(reply.reply.contains("Analytical Engines"));
    assert!(reply.recorded_emails.is_empty());
    assert_eq!(h.retriever.queries(), 1);
    assert_eq!(h.generator.calls(), 1);
    assert_eq!(h.judge.calls(), 1);

    let sent = request_text(&h.generator.requests()[0]);
    assert!(sent.contains(WORK_PASSAGE));
    assert!(!sent.contains(NO_INFORMATION_MARKER));
}

#[tokio::test]
async fn empty_retrieval_injects_marker_and_canned_reply_flows_through() {
    let h = harness(
        &[],
        vec![text(NOT_ENOUGH_INFORMATION)],
        vec![verdict(true, "correctly declined")],
        3,
    );

    let reply = h
        .controller
        .respond("What is your favourite food?", &[], &RecordedEmails::new())
        .await
        .unwrap();

    assert_eq!(reply.reply, NOT_ENOUGH_INFORMATION);
    let sent = request_text(&h.generator.requests()[0]);
    assert!(sent.contains(NO_INFORMATION_MARKER));
}

#[tokio::test]
async fn email_is_recorded_exactly_once() {
    let h = harness(
        &[WORK_PASSAGE],
        vec![
            tools(vec![record_contact_call("call_1", "a@b.com")]),
            text("Thanks, I'll send you a summary shortly."),
        ],
        vec![verdict(true, "good")],
        3,
    );

    let reply = h
        .controller
        .respond(
            "Can you email me a summary? my email is a@b.com",
            &[],
            &RecordedEmails::new(),
        )
        .await
        .unwrap();

    assert_eq!(h.store.puts(), 1);
    assert!(reply.recorded_emails.contains("a@b.com"));
    assert_eq!(reply.recorded_emails.len(), 1);

    // The second generator request carries the tool call and its result.
    let second = &h.generator.requests()[1];
    let tool_msg = second
        .messages
        .iter()
        .find(|m| m.role == MessageRole::Tool)
        .unwrap();
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    assert!(tool_msg.content.as_deref().unwrap().contains("success"));
}

#[tokio::test]
async fn repeated_email_in_session_is_not_written_again() {
    let h = harness(
        &[WORK_PASSAGE],
        vec![
            tools(vec![record_contact_call("call_1", "a@b.com")]),
            text("Got it."),
            tools(vec![record_contact_call("call_2", "a@b.com")]),
            text("You're already on my list."),
        ],
        vec![verdict(true, "good"), verdict(true, "good")],
        3,
    );

    let first_msg = "my email is a@b.com";
    let first = h
        .controller
        .respond(first_msg, &[], &RecordedEmails::new())
        .await
        .unwrap();
    assert_eq!(h.store.puts(), 1);

    let history = vec![Turn::user(first_msg), Turn::assistant(first.reply.clone())];
    let second = h
        .controller
        .respond("again, it's a@b.com", &history, &first.recorded_emails)
        .await
        .unwrap();

    assert_eq!(h.store.puts(), 1);
    assert_eq!(second.recorded_emails, first.recorded_emails);

    let last_request = h.generator.requests().pop().unwrap();
    let tool_msg = last_request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Tool)
        .unwrap();
    assert_eq!(
        tool_msg.content.as_deref(),
        Some(persona_chat::capability::ALREADY_RECORDED_MESSAGE)
    );
}

#[tokio::test]
async fn input_recorded_set_is_left_untouched() {
    let h = harness(
        &[],
        vec![
            tools(vec![record_contact_call("call_1", "new@b.com")]),
            text("Noted."),
        ],
        vec![verdict(true, "ok")],
        3,
    );
    let before: RecordedEmails = ["old@b.com".to_string()].into_iter().collect();

    let reply = h
        .controller
        .respond("reach me at new@b.com", &[], &before)
        .await
        .unwrap();

    assert_eq!(before.len(), 1);
    assert!(!before.contains("new@b.com"));
    assert!(reply.recorded_emails.contains("old@b.com"));
    assert!(reply.recorded_emails.contains("new@b.com"));
}

#[tokio::test]
async fn rejection_triggers_revision_with_feedback() {
    let h = harness(
        &[WORK_PASSAGE],
        vec![text("I build bridges."), text("I am a data engineer.")],
        vec![
            verdict(false, "The context says data engineer, not bridges."),
            verdict(true, "fixed"),
        ],
        3,
    );

    let reply = h
        .controller
        .respond("What do you do?", &[], &RecordedEmails::new())
        .await
        .unwrap();

    assert_eq!(reply.outcome, ReplyOutcome::Accepted { revisions: 1 });
    assert_eq!(reply.reply, "I am a data engineer.");

    let revision = request_text(&h.generator.requests()[1]);
    assert!(revision.contains("The context says data engineer, not bridges."));
    assert!(revision.contains("I build bridges."));
    assert!(revision.contains("What do you do?"));
}

#[tokio::test]
async fn revisions_are_bounded_and_give_up_appends_disclaimer() {
    let max_revisions = 2;
    let h = harness(
        &[WORK_PASSAGE],
        vec![text("draft 0"), text("draft 1"), text("draft 2"), text("never used")],
        vec![
            verdict(false, "no"),
            verdict(false, "still no"),
            verdict(false, "nope"),
            verdict(true, "never used"),
        ],
        max_revisions,
    );

    let reply = h
        .controller
        .respond("Tell me something", &[], &RecordedEmails::new())
        .await
        .unwrap();

    assert_eq!(reply.outcome, ReplyOutcome::GaveUp { revisions: 2 });
    assert!(reply.reply.starts_with("draft 2"));
    assert!(reply.reply.ends_with(GIVE_UP_DISCLAIMER));
    assert_eq!(h.generator.calls(), 1 + max_revisions);
    assert_eq!(h.judge.calls(), 1 + max_revisions);
    assert_eq!(h.generator.remaining(), 1);
}

#[tokio::test]
async fn zero_revision_budget_gives_up_after_first_rejection() {
    let h = harness(&[], vec![text("only draft")], vec![verdict(false, "bad")], 0);

    let reply = h
        .controller
        .respond("hi", &[], &RecordedEmails::new())
        .await
        .unwrap();

    assert_eq!(reply.outcome, ReplyOutcome::GaveUp { revisions: 0 });
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn malformed_judge_output_fails_the_turn() {
    let h = harness(
        &[WORK_PASSAGE],
        vec![text("I am a data engineer.")],
        vec![text("Looks fine to me!")],
        3,
    );

    let err = h
        .controller
        .respond("What do you do?", &[], &RecordedEmails::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::MalformedJudgeOutput(_)));
}

#[tokio::test]
async fn generator_errors_propagate_unmodified() {
    let h = harness(
        &[WORK_PASSAGE],
        vec![Err(ChatError::from_status(
            Service::Generator,
            429,
            "slow down",
        ))],
        vec![],
        3,
    );

    let err = h
        .controller
        .respond("What do you do?", &[], &RecordedEmails::new())
        .await
        .unwrap_err();

    match err {
        ChatError::ExternalService {
            service,
            kind,
            status,
            ..
        } => {
            assert_eq!(service, Service::Generator);
            assert_eq!(kind, ServiceErrorKind::RateLimit);
            assert_eq!(status, Some(429));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(h.judge.calls(), 0);
}

#[tokio::test]
async fn judge_sees_reply_message_and_history() {
    let h = harness(
        &[WORK_PASSAGE],
        vec![text("I am a data engineer.")],
        vec![verdict(true, "ok")],
        3,
    );
    let history = vec![Turn::user("hello"), Turn::assistant("Hi there!")];

    h.controller
        .respond("What do you do?", &history, &RecordedEmails::new())
        .await
        .unwrap();

    let judged = request_text(&h.judge.requests()[0]);
    assert!(judged.contains("I am a data engineer."));
    assert!(judged.contains("What do you do?"));
    assert!(judged.contains("user: hello"));
    assert!(judged.contains("assistant: Hi there!"));
    assert!(judged.contains("Ada Lovelace"));
}
