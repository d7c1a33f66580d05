//! End-to-end session scenarios driven through a recording event sink.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use classpoll::polls::{CloseReason, ConnectionId, PollRequest, PollState};
use classpoll::session::{
    Audience, EventSink, Role, ServerEvent, Session, SessionSettings,
};

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(Audience, ServerEvent)>>,
}

impl EventSink for RecordingSink {
    fn join(&self, _connection_id: &ConnectionId, _role: Role) {}

    fn send(&self, audience: Audience, event: ServerEvent) {
        self.sent.lock().push((audience, event));
    }
}

impl RecordingSink {
    fn take(&self) -> Vec<(Audience, ServerEvent)> {
        std::mem::take(&mut *self.sent.lock())
    }

    fn ended(&self) -> Vec<CloseReason> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(_, event)| match event {
                ServerEvent::PollEnded(ended) => Some(ended.reason),
                _ => None,
            })
            .collect()
    }
}

fn setup() -> (Arc<Session>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let session = Session::new(sink.clone(), SessionSettings::default());
    (session, sink)
}

fn color_poll() -> PollRequest {
    PollRequest::new("Color?", ["Red", "Blue", "Green"])
}

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_three_students_close_on_third_answer() {
    let (session, sink) = setup();
    for (id, name) in [("s1", "Ada"), ("s2", "Grace"), ("s3", "Linus")] {
        session.student_join(&id.into(), name);
    }
    session.create_poll(&"t1".into(), color_poll());

    session.submit_answer(&"s1".into(), "Red");
    session.submit_answer(&"s2".into(), "Blue");
    assert_eq!(session.poll_state(), PollState::Active);
    assert!(sink.ended().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    session.submit_answer(&"s3".into(), "Green");

    assert_eq!(session.poll_state(), PollState::Closed);
    assert_eq!(sink.ended(), vec![CloseReason::Completed]);
    let poll = session.current_poll().unwrap();
    assert_eq!(poll.answers.len(), 3);
    assert!(!poll.is_active);

    // The cancelled countdown never produces a second close
    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(sink.ended(), vec![CloseReason::Completed]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_roster_closes_only_by_timeout() {
    let (session, sink) = setup();
    session.create_poll(&"t1".into(), PollRequest::new("Color?", ["Red", "Blue"]));
    assert_eq!(session.student_count(), 0);

    tokio::time::sleep(Duration::from_secs(59)).await;
    settle().await;
    assert_eq!(session.poll_state(), PollState::Active);
    assert!(sink.ended().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(session.poll_state(), PollState::Closed);
    assert_eq!(sink.ended(), vec![CloseReason::Timeout]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_closes_partially_answered_poll() {
    let (session, sink) = setup();
    session.student_join(&"s1".into(), "Ada");
    session.student_join(&"s2".into(), "Grace");
    session.create_poll(&"t1".into(), color_poll());
    session.submit_answer(&"s1".into(), "Red");
    sink.take();

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    let sent = sink.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Audience::Everyone);
    match &sent[0].1 {
        ServerEvent::PollEnded(ended) => {
            assert_eq!(ended.reason, CloseReason::Timeout);
            assert_eq!(ended.poll.answers.len(), 1);
            assert_eq!(ended.results[0].count, 1);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Late answers after the close are dropped silently
    session.submit_answer(&"s2".into(), "Blue");
    assert!(sink.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_conflict_while_previous_poll_incomplete() {
    let (session, sink) = setup();
    for id in ["s1", "s2", "s3", "s4", "s5"] {
        session.student_join(&id.into(), id);
    }
    session.create_poll(&"t1".into(), color_poll());
    let first = session.current_poll().unwrap();
    session.submit_answer(&"s1".into(), "Red");
    session.submit_answer(&"s2".into(), "Blue");
    sink.take();

    session.create_poll(&"t1".into(), PollRequest::new("Shape?", ["Circle", "Square"]));

    let sent = sink.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Audience::Connection("t1".into()));
    assert_eq!(
        sent[0].1,
        ServerEvent::error("Cannot create poll: Previous question not completed")
    );
    let current = session.current_poll().unwrap();
    assert_eq!(current.id, first.id);
    assert_eq!(current.answers.len(), 2);
    assert!(current.is_active);
}

#[tokio::test(start_paused = true)]
async fn test_new_poll_after_timeout_gets_fresh_countdown() {
    let (session, sink) = setup();
    session.student_join(&"s1".into(), "Ada");
    session.create_poll(&"t1".into(), color_poll());

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(sink.ended(), vec![CloseReason::Timeout]);

    session.create_poll(&"t1".into(), PollRequest::new("Shape?", ["Circle", "Square"]));
    let second = session.current_poll().unwrap();
    assert_eq!(second.question, "Shape?");
    assert!(second.is_active);
    assert!(second.answers.is_empty());

    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(session.poll_state(), PollState::Active);

    session.submit_answer(&"s1".into(), "Square");
    assert_eq!(
        sink.ended(),
        vec![CloseReason::Timeout, CloseReason::Completed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_of_unanswered_student_does_not_close() {
    let (session, sink) = setup();
    session.student_join(&"s1".into(), "Ada");
    session.student_join(&"s2".into(), "Grace");
    session.create_poll(&"t1".into(), color_poll());
    session.submit_answer(&"s1".into(), "Red");

    session.disconnect(&"s2".into());
    assert_eq!(session.student_count(), 1);
    // Completion is only evaluated on submission
    assert_eq!(session.poll_state(), PollState::Active);
    assert!(sink.ended().is_empty());

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(sink.ended(), vec![CloseReason::Timeout]);
}

#[tokio::test(start_paused = true)]
async fn test_teacher_progress_carries_tally() {
    let (session, sink) = setup();
    session.student_join(&"s1".into(), "Ada");
    session.student_join(&"s2".into(), "Grace");
    session.create_poll(&"t1".into(), color_poll().with_correct_answer("Blue"));
    sink.take();

    session.submit_answer(&"s1".into(), "Blue");
    let sent = sink.take();
    let progress = sent
        .iter()
        .find_map(|(audience, event)| match (audience, event) {
            (Audience::Teachers, ServerEvent::PollAnswer(progress)) => Some(progress.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(progress.student_name, "Ada");
    assert_eq!(progress.answer, "Blue");
    assert_eq!(progress.total_answers, 1);
    assert_eq!(progress.total_students, 2);
    let blue = progress.results.iter().find(|e| e.option == "Blue").unwrap();
    assert_eq!(blue.count, 1);
    assert_eq!(blue.is_correct, Some(true));
    assert!((blue.percentage - 100.0).abs() < f64::EPSILON);
}
