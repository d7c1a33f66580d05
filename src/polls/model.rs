//! Poll data model
//!
//! Participants, answers, polls and the per-option tally computed from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque identity of one transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh random connection identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A connected student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub display_name: String,
}

/// One recorded answer. Never amended once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    #[serde(rename = "studentId")]
    pub connection_id: ConnectionId,
    #[serde(rename = "studentName")]
    pub display_name: String,
    #[serde(rename = "answer")]
    pub choice: String,
}

/// Teacher's request to open a new poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
}

impl PollRequest {
    pub fn new<I, S>(question: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            question: question.into(),
            options: options.into_iter().map(Into::into).collect(),
            correct_answer: None,
        }
    }

    pub fn with_correct_answer(mut self, answer: impl Into<String>) -> Self {
        self.correct_answer = Some(answer.into());
        self
    }
}

/// One question round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    /// Monotonic poll number within the session
    pub id: u64,
    pub question: String,
    pub options: Vec<String>,
    /// Arrival order
    pub answers: Vec<Answer>,
    pub is_active: bool,
    /// Unix ms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

impl Poll {
    pub fn has_answered(&self, connection_id: &ConnectionId) -> bool {
        self.answers
            .iter()
            .any(|answer| &answer.connection_id == connection_id)
    }

    /// Whole seconds left on the countdown, floored at zero.
    pub fn remaining_seconds(&self, now_ms: i64, timeout: Duration) -> u64 {
        let Some(start) = self.start_time else {
            return 0;
        };
        let elapsed_secs = (now_ms - start).max(0) as u64 / 1000;
        timeout.as_secs().saturating_sub(elapsed_secs)
    }

    pub fn tally(&self) -> Vec<TallyEntry> {
        tally(self)
    }
}

/// Aggregate for one option.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyEntry {
    pub option: String,
    pub count: usize,
    /// Unrounded; 0 when there are no answers
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

/// Count answers per option, in option order.
///
/// Matching is exact and case-sensitive. Answers that match no option are
/// still part of the denominator but appear in no entry.
pub fn tally(poll: &Poll) -> Vec<TallyEntry> {
    let total = poll.answers.len();
    poll.options
        .iter()
        .map(|option| {
            let count = poll
                .answers
                .iter()
                .filter(|answer| &answer.choice == option)
                .count();
            let percentage = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            };
            TallyEntry {
                option: option.clone(),
                count,
                percentage,
                is_correct: poll
                    .correct_answer
                    .as_ref()
                    .map(|correct| correct == option),
            }
        })
        .collect()
}

/// Why a poll stopped accepting answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    Completed,
    Timeout,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Completed => "completed",
            CloseReason::Timeout => "timeout",
        }
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
