//! Event protocol between clients and the session.
//!
//! Each WebSocket text frame carries one event: `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::polls::{CloseReason, Poll, PollRequest, TallyEntry};

/// Commands sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "teacher:join")]
    TeacherJoin,
    #[serde(rename = "student:join")]
    StudentJoin(String),
    #[serde(rename = "teacher:create-poll")]
    CreatePoll(PollRequest),
    #[serde(rename = "student:submit-answer")]
    SubmitAnswer(String),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::TeacherJoin => "teacher:join",
            ClientEvent::StudentJoin(_) => "student:join",
            ClientEvent::CreatePoll(_) => "teacher:create-poll",
            ClientEvent::SubmitAnswer(_) => "student:submit-answer",
        }
    }
}

/// Notifications sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "poll:current")]
    PollCurrent(Option<Poll>),
    #[serde(rename = "poll:new")]
    PollNew(Poll),
    #[serde(rename = "poll:answer")]
    PollAnswer(AnswerProgress),
    #[serde(rename = "answer:submitted")]
    AnswerSubmitted(bool),
    #[serde(rename = "poll:ended")]
    PollEnded(PollEnded),
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::PollCurrent(_) => "poll:current",
            ServerEvent::PollNew(_) => "poll:new",
            ServerEvent::PollAnswer(_) => "poll:answer",
            ServerEvent::AnswerSubmitted(_) => "answer:submitted",
            ServerEvent::PollEnded(_) => "poll:ended",
            ServerEvent::Error(_) => "error",
        }
    }
}

/// Running progress sent to teachers on every accepted answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerProgress {
    pub student_name: String,
    pub answer: String,
    pub total_answers: usize,
    pub total_students: usize,
    pub results: Vec<TallyEntry>,
}

/// Closed poll plus how it closed and its final tally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollEnded {
    #[serde(flatten)]
    pub poll: Poll,
    pub reason: CloseReason,
    pub results: Vec<TallyEntry>,
}

impl PollEnded {
    pub fn new(poll: Poll, reason: CloseReason) -> Self {
        let results = poll.tally();
        Self {
            poll,
            reason,
            results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}
