//! Polling Module
//!
//! Roster, poll state machine and poll timeout for a single live session.

pub mod engine;
pub mod model;
pub mod roster;
pub mod timer;

pub use engine::{IgnoreReason, PollEngine, PollError, PollState, SubmitOutcome, MIN_OPTIONS};
pub use model::{
    now_millis, tally, Answer, CloseReason, ConnectionId, Participant, Poll, PollRequest,
    TallyEntry,
};
pub use roster::Roster;
pub use timer::{TimeoutHandle, TimeoutScheduler, DEFAULT_POLL_TIMEOUT};
