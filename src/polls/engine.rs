//! Poll Engine
//!
//! Owns the current poll and its lifecycle: creation, answer collection and
//! closure. The engine is clock-free and timer-free; callers pass the current
//! time in and arm or cancel timeouts themselves.

use super::model::{Answer, ConnectionId, Poll, PollRequest};
use super::roster::Roster;
use thiserror::Error;

/// Minimum number of non-blank options a poll must offer.
pub const MIN_OPTIONS: usize = 2;

/// Reasons a poll cannot be created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("Please enter a question")]
    EmptyQuestion,

    #[error("Please provide at least {required} options (got {found})")]
    NotEnoughOptions { found: usize, required: usize },

    #[error("Cannot create poll: Previous question not completed")]
    PreviousPollIncomplete { answered: usize, expected: usize },
}

impl PollError {
    /// True for malformed requests, false for lifecycle conflicts.
    pub fn is_validation(&self) -> bool {
        !matches!(self, PollError::PreviousPollIncomplete { .. })
    }
}

/// Lifecycle state of the current poll slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    NoPoll,
    Active,
    Closed,
}

/// Why a submission was dropped. Never reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownParticipant,
    NoPoll,
    PollClosed,
    AlreadyAnswered,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::UnknownParticipant => "unknown_participant",
            IgnoreReason::NoPoll => "no_poll",
            IgnoreReason::PollClosed => "poll_closed",
            IgnoreReason::AlreadyAnswered => "already_answered",
        }
    }
}

/// Result of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Ignored(IgnoreReason),
    /// `closed` is set when this answer completed the poll.
    Accepted { closed: bool },
}

/// Single-slot poll state machine.
#[derive(Debug)]
pub struct PollEngine {
    current: Option<Poll>,
    next_id: u64,
    min_options: usize,
}

impl Default for PollEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PollEngine {
    pub fn new() -> Self {
        Self::with_min_options(MIN_OPTIONS)
    }

    pub fn with_min_options(min_options: usize) -> Self {
        Self {
            current: None,
            next_id: 1,
            min_options: min_options.max(MIN_OPTIONS),
        }
    }

    pub fn current(&self) -> Option<&Poll> {
        self.current.as_ref()
    }

    pub fn state(&self) -> PollState {
        match &self.current {
            None => PollState::NoPoll,
            Some(poll) if poll.is_active => PollState::Active,
            Some(_) => PollState::Closed,
        }
    }

    /// The current poll holds as many answers as there are rostered
    /// students, and there is at least one student.
    pub fn is_complete(&self, roster: &Roster) -> bool {
        match &self.current {
            Some(poll) => answers_match_roster(poll, roster),
            None => false,
        }
    }

    /// Open a new poll, replacing whatever was current.
    ///
    /// Rejected while the current poll is active and its answer count has not
    /// reached the roster size.
    pub fn create(
        &mut self,
        request: PollRequest,
        roster: &Roster,
        now_ms: i64,
    ) -> Result<&Poll, PollError> {
        let PollRequest {
            question,
            options,
            correct_answer,
        } = request;

        if question.trim().is_empty() {
            return Err(PollError::EmptyQuestion);
        }

        let options: Vec<String> = options
            .into_iter()
            .filter(|option| !option.trim().is_empty())
            .collect();
        if options.len() < self.min_options {
            return Err(PollError::NotEnoughOptions {
                found: options.len(),
                required: self.min_options,
            });
        }

        if let Some(poll) = &self.current {
            if poll.is_active && !answers_match_roster(poll, roster) {
                return Err(PollError::PreviousPollIncomplete {
                    answered: poll.answers.len(),
                    expected: roster.size(),
                });
            }
        }

        let id = self.next_id;
        self.next_id += 1;

        let poll = self.current.insert(Poll {
            id,
            question,
            options,
            answers: Vec::new(),
            is_active: true,
            start_time: Some(now_ms),
            correct_answer: correct_answer.filter(|answer| !answer.trim().is_empty()),
        });
        Ok(&*poll)
    }

    /// Record an answer for a rostered student.
    ///
    /// Closes the poll when the answer completes it.
    pub fn submit_answer(
        &mut self,
        roster: &Roster,
        connection_id: &ConnectionId,
        choice: impl Into<String>,
    ) -> SubmitOutcome {
        let Some(participant) = roster.get(connection_id) else {
            return SubmitOutcome::Ignored(IgnoreReason::UnknownParticipant);
        };
        let Some(poll) = self.current.as_mut() else {
            return SubmitOutcome::Ignored(IgnoreReason::NoPoll);
        };
        if !poll.is_active {
            return SubmitOutcome::Ignored(IgnoreReason::PollClosed);
        }
        if poll.has_answered(connection_id) {
            return SubmitOutcome::Ignored(IgnoreReason::AlreadyAnswered);
        }

        poll.answers.push(Answer {
            connection_id: connection_id.clone(),
            display_name: participant.display_name.clone(),
            choice: choice.into(),
        });

        let closed = answers_match_roster(poll, roster);
        if closed {
            poll.is_active = false;
        }
        SubmitOutcome::Accepted { closed }
    }

    /// Timer path: close poll `poll_id` if it is still current and active.
    ///
    /// Returns false (and changes nothing) when the poll was already closed
    /// or has since been replaced.
    pub fn expire_by_timeout(&mut self, poll_id: u64) -> bool {
        match self.current.as_mut() {
            Some(poll) if poll.id == poll_id && poll.is_active => {
                poll.is_active = false;
                true
            }
            _ => false,
        }
    }
}

/// Completion is a count comparison against the live roster size.
fn answers_match_roster(poll: &Poll, roster: &Roster) -> bool {
    !roster.is_empty() && poll.answers.len() == roster.size()
}
