//! Single-slot poll timeout.
//!
//! At most one countdown exists at a time. Arming a new one aborts the
//! previous task first. Cancelling is idempotent and safe after the timer
//! has already fired.

use std::time::Duration;
use tokio::task::JoinHandle;

/// Default lifetime of a poll before it is closed by timeout.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Identifies one armed countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutHandle {
    id: u64,
}

#[derive(Debug)]
struct ArmedTimeout {
    handle: TimeoutHandle,
    task: JoinHandle<()>,
}

/// Holds the one outstanding timeout.
#[derive(Debug, Default)]
pub struct TimeoutScheduler {
    next_id: u64,
    armed: Option<ArmedTimeout>,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a countdown, replacing any previous one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&mut self, duration: Duration, on_fire: F) -> TimeoutHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel_armed();

        self.next_id += 1;
        let handle = TimeoutHandle { id: self.next_id };
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            on_fire();
        });
        self.armed = Some(ArmedTimeout { handle, task });
        handle
    }

    /// Cancel `handle` if it is still the armed countdown.
    pub fn cancel(&mut self, handle: TimeoutHandle) {
        if self.armed.as_ref().map(|armed| armed.handle) == Some(handle) {
            self.cancel_armed();
        }
    }

    /// Cancel whatever is armed.
    pub fn cancel_armed(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
        }
    }

    /// True while a countdown is pending (armed and not yet fired).
    pub fn is_armed(&self) -> bool {
        self.armed
            .as_ref()
            .map(|armed| !armed.task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        self.cancel_armed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter_callback(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_duration() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TimeoutScheduler::new();
        scheduler.arm(Duration::from_secs(60), counter_callback(&fired));
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TimeoutScheduler::new();
        let handle = scheduler.arm(Duration::from_secs(60), counter_callback(&fired));
        scheduler.cancel(handle);
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TimeoutScheduler::new();

        let stale = scheduler.arm(Duration::from_secs(60), counter_callback(&first));
        tokio::time::sleep(Duration::from_secs(30)).await;
        scheduler.arm(Duration::from_secs(60), counter_callback(&second));

        // Cancelling the replaced handle must not touch the new countdown
        scheduler.cancel(stale);
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fire_is_noop() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TimeoutScheduler::new();
        let handle = scheduler.arm(Duration::from_secs(1), counter_callback(&fired));

        tokio::time::sleep(Duration::from_secs(2)).await;
        scheduler.cancel(handle);
        scheduler.cancel(handle);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
