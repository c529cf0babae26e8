use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::clock::lock;
use crate::commands::{ButtonId, Gesture};
use crate::input::GestureSubscriber;

pub trait ClickScheduler: Send + Sync {
    /// Arm the one-shot for `button`, replacing any pending one. If it is
    /// still pending at `deadline`, `gesture` goes to the subscriber.
    fn schedule(&self, button: ButtonId, deadline: Instant, gesture: Gesture);

    /// Disarm the pending one-shot for `button`. Returns `false` when there
    /// was nothing to cancel, including when it has already fired.
    fn cancel(&self, button: ButtonId) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct PendingClick {
    deadline: Instant,
    gesture: Gesture,
}

type PendingMap = Arc<Mutex<HashMap<ButtonId, PendingClick>>>;

/// Remove and return everything due at `now`, earliest first.
fn take_due(pending: &PendingMap, now: Instant) -> Vec<Gesture> {
    let mut map = lock(pending);
    let mut due: Vec<PendingClick> = map.values().filter(|p| p.deadline <= now).copied().collect();
    map.retain(|_, p| p.deadline > now);
    due.sort_by_key(|p| p.deadline);
    due.into_iter().map(|p| p.gesture).collect()
}

enum Wake {
    Rearm,
    Shutdown,
}

/// Production scheduler: a dedicated thread sleeps until the earliest
/// deadline and emits from there, never from the poll loop.
pub struct TimerScheduler {
    pending: PendingMap,
    wake: Sender<Wake>,
    worker: Option<JoinHandle<()>>,
}

impl TimerScheduler {
    pub fn spawn(subscriber: Arc<dyn GestureSubscriber>) -> std::io::Result<Self> {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (wake, wake_rx) = crossbeam_channel::unbounded();
        let worker_pending = Arc::clone(&pending);
        let worker = thread::Builder::new()
            .name("click-timer".to_string())
            .spawn(move || timer_main(worker_pending, wake_rx, subscriber))?;

        Ok(Self {
            pending,
            wake,
            worker: Some(worker),
        })
    }
}

fn timer_main(pending: PendingMap, wake_rx: Receiver<Wake>, subscriber: Arc<dyn GestureSubscriber>) {
    loop {
        let next_deadline = lock(&pending).values().map(|p| p.deadline).min();

        let wake = match next_deadline {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                crossbeam_channel::select! {
                    recv(wake_rx) -> msg => msg.ok(),
                    default(timeout) => Some(Wake::Rearm),
                }
            }
            None => wake_rx.recv().ok(),
        };

        match wake {
            Some(Wake::Rearm) => {}
            Some(Wake::Shutdown) | None => break,
        }

        for gesture in take_due(&pending, Instant::now()) {
            log::debug!("Deferred gesture elapsed: {}", gesture);
            subscriber.on_gesture(gesture);
        }
    }
}

impl ClickScheduler for TimerScheduler {
    fn schedule(&self, button: ButtonId, deadline: Instant, gesture: Gesture) {
        lock(&self.pending).insert(button, PendingClick { deadline, gesture });
        let _ = self.wake.send(Wake::Rearm);
    }

    fn cancel(&self, button: ButtonId) -> bool {
        let cancelled = lock(&self.pending).remove(&button).is_some();
        if cancelled {
            let _ = self.wake.send(Wake::Rearm);
        }
        cancelled
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        let _ = self.wake.send(Wake::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Deterministic scheduler: nothing fires until [`advance_to`] is called.
///
/// [`advance_to`]: ManualScheduler::advance_to
pub struct ManualScheduler {
    pending: PendingMap,
    subscriber: Arc<dyn GestureSubscriber>,
}

impl ManualScheduler {
    pub fn new(subscriber: Arc<dyn GestureSubscriber>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            subscriber,
        }
    }

    /// Fire everything due at `now`; returns how many fired.
    pub fn advance_to(&self, now: Instant) -> usize {
        let due = take_due(&self.pending, now);
        let fired = due.len();
        for gesture in due {
            self.subscriber.on_gesture(gesture);
        }
        fired
    }

    pub fn is_pending(&self, button: ButtonId) -> bool {
        lock(&self.pending).contains_key(&button)
    }
}

impl ClickScheduler for ManualScheduler {
    fn schedule(&self, button: ButtonId, deadline: Instant, gesture: Gesture) {
        lock(&self.pending).insert(button, PendingClick { deadline, gesture });
    }

    fn cancel(&self, button: ButtonId) -> bool {
        lock(&self.pending).remove(&button).is_some()
    }
}
