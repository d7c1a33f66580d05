//! Live poll session
//!
//! The [`Session`] is the one place that mutates poll state. Every client
//! command and the poll timer go through the same mutex, so commands are
//! applied one at a time and a timeout racing the final answer resolves to
//! whichever takes the lock first.
//!
//! Outbound notifications go through an [`EventSink`], which knows how to
//! reach a single connection or a whole audience.

pub mod protocol;

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::metrics::STD_METRICS;
use crate::polls::{
    now_millis, CloseReason, ConnectionId, Poll, PollEngine, PollRequest, PollState, Roster,
    SubmitOutcome, TallyEntry, TimeoutScheduler, DEFAULT_POLL_TIMEOUT, MIN_OPTIONS,
};

pub use protocol::{AnswerProgress, ClientEvent, ErrorPayload, PollEnded, ServerEvent};

/// Broadcast group a connection can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Teacher,
    Student,
}

/// Who receives a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Connection(ConnectionId),
    Teachers,
    Students,
    Everyone,
}

/// Delivery seam between the session and the transport.
///
/// Implementations must not block and must not call back into the session.
pub trait EventSink: Send + Sync {
    /// Add a connection to a broadcast group.
    fn join(&self, connection_id: &ConnectionId, role: Role);

    /// Deliver an event.
    fn send(&self, audience: Audience, event: ServerEvent);
}

/// Session tunables.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub poll_timeout: Duration,
    pub min_options: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            min_options: MIN_OPTIONS,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    roster: Roster,
    engine: PollEngine,
    timer: TimeoutScheduler,
}

/// Read-only view of the session for HTTP consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub poll: Option<Poll>,
    pub results: Vec<TallyEntry>,
    pub remaining_seconds: u64,
    pub students: usize,
}

/// Coordinator for one classroom.
pub struct Session {
    state: Mutex<SessionState>,
    sink: Arc<dyn EventSink>,
    settings: SessionSettings,
    weak_self: Weak<Session>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(sink: Arc<dyn EventSink>, settings: SessionSettings) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            state: Mutex::new(SessionState {
                roster: Roster::new(),
                engine: PollEngine::with_min_options(settings.min_options),
                timer: TimeoutScheduler::new(),
            }),
            sink,
            settings,
            weak_self: weak_self.clone(),
        })
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Apply one client command.
    pub fn handle(&self, connection_id: &ConnectionId, event: ClientEvent) {
        debug!(conn_id = %connection_id, event = event.name(), "client event");
        match event {
            ClientEvent::TeacherJoin => self.teacher_join(connection_id),
            ClientEvent::StudentJoin(name) => self.student_join(connection_id, name),
            ClientEvent::CreatePoll(request) => self.create_poll(connection_id, request),
            ClientEvent::SubmitAnswer(choice) => self.submit_answer(connection_id, choice),
        }
    }

    pub fn teacher_join(&self, connection_id: &ConnectionId) {
        let state = self.state.lock();
        self.sink.join(connection_id, Role::Teacher);
        info!(conn_id = %connection_id, "teacher joined");
        self.sink.send(
            Audience::Connection(connection_id.clone()),
            ServerEvent::PollCurrent(state.engine.current().cloned()),
        );
    }

    pub fn student_join(&self, connection_id: &ConnectionId, display_name: impl Into<String>) {
        let mut state = self.state.lock();
        let display_name = display_name.into();
        info!(conn_id = %connection_id, name = %display_name, "student joined");
        state.roster.join(connection_id.clone(), display_name);
        STD_METRICS.students_connected.set(state.roster.size() as f64);

        self.sink.join(connection_id, Role::Student);
        self.sink.send(
            Audience::Connection(connection_id.clone()),
            ServerEvent::PollCurrent(state.engine.current().cloned()),
        );
    }

    pub fn create_poll(&self, connection_id: &ConnectionId, request: PollRequest) {
        let mut guard = self.state.lock();
        let SessionState {
            roster,
            engine,
            timer,
        } = &mut *guard;

        match engine.create(request, roster, now_millis()) {
            Ok(poll) => {
                let poll = poll.clone();
                let weak = self.weak_self.clone();
                let poll_id = poll.id;
                timer.arm(self.settings.poll_timeout, move || {
                    if let Some(session) = weak.upgrade() {
                        session.expire_poll(poll_id);
                    }
                });

                STD_METRICS.polls_created_total.inc();
                info!(
                    poll_id,
                    question = %poll.question,
                    options = poll.options.len(),
                    students = roster.size(),
                    "poll created"
                );
                self.sink.send(Audience::Everyone, ServerEvent::PollNew(poll));
            }
            Err(err) => {
                STD_METRICS.polls_rejected_total.inc();
                warn!(conn_id = %connection_id, error = %err, "poll rejected");
                self.sink.send(
                    Audience::Connection(connection_id.clone()),
                    ServerEvent::error(err.to_string()),
                );
            }
        }
    }

    pub fn submit_answer(&self, connection_id: &ConnectionId, choice: impl Into<String>) {
        let mut guard = self.state.lock();
        let SessionState {
            roster,
            engine,
            timer,
        } = &mut *guard;

        let choice = choice.into();
        let closed = match engine.submit_answer(roster, connection_id, choice.clone()) {
            SubmitOutcome::Ignored(reason) => {
                STD_METRICS.answers_ignored_total.inc();
                debug!(conn_id = %connection_id, reason = reason.as_str(), "answer ignored");
                return;
            }
            SubmitOutcome::Accepted { closed } => closed,
        };
        STD_METRICS.answers_accepted_total.inc();

        // Accepted answers imply a rostered participant and a current poll
        let (Some(poll), Some(participant)) = (engine.current(), roster.get(connection_id)) else {
            return;
        };

        debug!(
            conn_id = %connection_id,
            poll_id = poll.id,
            answered = poll.answers.len(),
            expected = roster.size(),
            "answer accepted"
        );

        self.sink.send(
            Audience::Teachers,
            ServerEvent::PollAnswer(AnswerProgress {
                student_name: participant.display_name.clone(),
                answer: choice,
                total_answers: poll.answers.len(),
                total_students: roster.size(),
                results: poll.tally(),
            }),
        );
        self.sink.send(
            Audience::Connection(connection_id.clone()),
            ServerEvent::AnswerSubmitted(true),
        );

        if closed {
            timer.cancel_armed();
            self.announce_closed(poll.clone(), CloseReason::Completed);
        }
    }

    pub fn disconnect(&self, connection_id: &ConnectionId) {
        let mut state = self.state.lock();
        if state.roster.remove(connection_id).is_some() {
            STD_METRICS.students_connected.set(state.roster.size() as f64);
            info!(conn_id = %connection_id, students = state.roster.size(), "student left");
        }
    }

    /// Timer callback: close `poll_id` if it is still the active poll.
    pub(crate) fn expire_poll(&self, poll_id: u64) {
        let mut state = self.state.lock();
        if !state.engine.expire_by_timeout(poll_id) {
            debug!(poll_id, "stale poll timeout ignored");
            return;
        }
        if let Some(poll) = state.engine.current() {
            self.announce_closed(poll.clone(), CloseReason::Timeout);
        }
    }

    fn announce_closed(&self, poll: Poll, reason: CloseReason) {
        STD_METRICS.polls_closed_total.inc(&[reason.as_str()]);
        info!(
            poll_id = poll.id,
            reason = reason.as_str(),
            answers = poll.answers.len(),
            "poll closed"
        );
        self.sink.send(
            Audience::Everyone,
            ServerEvent::PollEnded(PollEnded::new(poll, reason)),
        );
    }

    pub fn current_poll(&self) -> Option<Poll> {
        self.state.lock().engine.current().cloned()
    }

    pub fn poll_state(&self) -> PollState {
        self.state.lock().engine.state()
    }

    pub fn student_count(&self) -> usize {
        self.state.lock().roster.size()
    }

    pub fn is_timer_armed(&self) -> bool {
        self.state.lock().timer.is_armed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        let poll = state.engine.current().cloned();
        let results = poll.as_ref().map(Poll::tally).unwrap_or_default();
        let remaining_seconds = poll
            .as_ref()
            .filter(|poll| poll.is_active)
            .map(|poll| poll.remaining_seconds(now_millis(), self.settings.poll_timeout))
            .unwrap_or(0);
        SessionSnapshot {
            poll,
            results,
            remaining_seconds,
            students: state.roster.size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        joins: Mutex<Vec<(ConnectionId, Role)>>,
        sent: Mutex<Vec<(Audience, ServerEvent)>>,
    }

    impl EventSink for RecordingSink {
        fn join(&self, connection_id: &ConnectionId, role: Role) {
            self.joins.lock().push((connection_id.clone(), role));
        }

        fn send(&self, audience: Audience, event: ServerEvent) {
            self.sent.lock().push((audience, event));
        }
    }

    impl RecordingSink {
        fn take(&self) -> Vec<(Audience, ServerEvent)> {
            std::mem::take(&mut *self.sent.lock())
        }
    }

    fn session() -> (Arc<Session>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let session = Session::new(sink.clone(), SessionSettings::default());
        (session, sink)
    }

    #[tokio::test]
    async fn test_teacher_join_gets_current_snapshot() {
        let (session, sink) = session();
        session.teacher_join(&"t1".into());

        assert_eq!(sink.joins.lock()[0], ("t1".into(), Role::Teacher));
        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Audience::Connection("t1".into()));
        assert_eq!(sent[0].1, ServerEvent::PollCurrent(None));
    }

    #[tokio::test]
    async fn test_student_join_registers_roster() {
        let (session, sink) = session();
        session.student_join(&"s1".into(), "Ada");
        assert_eq!(session.student_count(), 1);
        assert_eq!(sink.joins.lock()[0], ("s1".into(), Role::Student));

        session.disconnect(&"s1".into());
        session.disconnect(&"s1".into());
        assert_eq!(session.student_count(), 0);
    }

    #[tokio::test]
    async fn test_create_poll_broadcasts_and_arms_timer() {
        let (session, sink) = session();
        session.create_poll(&"t1".into(), PollRequest::new("Color?", ["Red", "Blue"]));

        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Audience::Everyone);
        assert!(matches!(&sent[0].1, ServerEvent::PollNew(poll) if poll.is_active));
        assert!(session.is_timer_armed());
        assert_eq!(session.poll_state(), PollState::Active);
    }

    #[tokio::test]
    async fn test_invalid_poll_errors_to_requester_only() {
        let (session, sink) = session();
        session.create_poll(&"t1".into(), PollRequest::new("", ["Red", "Blue"]));

        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Audience::Connection("t1".into()));
        assert!(matches!(&sent[0].1, ServerEvent::Error(_)));
        assert!(session.current_poll().is_none());
        assert!(!session.is_timer_armed());
    }

    #[tokio::test]
    async fn test_ignored_answer_sends_nothing() {
        let (session, sink) = session();
        session.submit_answer(&"ghost".into(), "Red");
        assert!(sink.take().is_empty());
    }

    #[tokio::test]
    async fn test_final_answer_closes_and_cancels_timer() {
        let (session, sink) = session();
        session.student_join(&"s1".into(), "Ada");
        session.create_poll(&"t1".into(), PollRequest::new("Color?", ["Red", "Blue"]));
        sink.take();

        session.submit_answer(&"s1".into(), "Red");
        let sent = sink.take();
        let names: Vec<_> = sent.iter().map(|(_, event)| event.name()).collect();
        assert_eq!(names, vec!["poll:answer", "answer:submitted", "poll:ended"]);
        assert_eq!(sent[0].0, Audience::Teachers);
        assert_eq!(sent[1].0, Audience::Connection("s1".into()));
        assert_eq!(sent[2].0, Audience::Everyone);
        match &sent[2].1 {
            ServerEvent::PollEnded(ended) => {
                assert_eq!(ended.reason, CloseReason::Completed);
                assert!(!ended.poll.is_active);
                assert_eq!(ended.results[0].count, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!session.is_timer_armed());
    }

    #[tokio::test]
    async fn test_stale_expiry_is_noop() {
        let (session, sink) = session();
        session.create_poll(&"t1".into(), PollRequest::new("Color?", ["Red", "Blue"]));
        let id = session.current_poll().unwrap().id;
        sink.take();

        session.expire_poll(id + 1);
        assert!(sink.take().is_empty());
        assert_eq!(session.poll_state(), PollState::Active);

        session.expire_poll(id);
        session.expire_poll(id);
        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.name(), "poll:ended");
    }

    #[tokio::test]
    async fn test_snapshot_reports_countdown() {
        let (session, _sink) = session();
        session.student_join(&"s1".into(), "Ada");
        session.create_poll(&"t1".into(), PollRequest::new("Color?", ["Red", "Blue"]));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.students, 1);
        assert_eq!(snapshot.results.len(), 2);
        assert!(snapshot.remaining_seconds >= 59 && snapshot.remaining_seconds <= 60);
    }
}
