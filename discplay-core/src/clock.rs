use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Source of "now" plus a cancellable wait.
///
/// Probe and termination loops go through this instead of calling
/// `thread::sleep`, so tests can swap in a [`ManualClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Wait for `duration` or until `token` is cancelled.
    /// Returns `true` if the wait ended because of cancellation.
    fn wait(&self, duration: Duration, token: &CancellationToken) -> bool;

    fn sleep(&self, duration: Duration) {
        let _ = self.wait(duration, &CancellationToken::new());
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait(&self, duration: Duration, token: &CancellationToken) -> bool {
        token.wait_timeout(duration)
    }
}

/// Deterministic clock: time only moves when advanced, and every wait
/// advances it by the full duration immediately.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *lock(&self.offset)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *lock(&self.offset)
    }

    fn wait(&self, duration: Duration, token: &CancellationToken) -> bool {
        if token.is_cancelled() {
            return true;
        }
        self.advance(duration);
        token.is_cancelled()
    }
}

/// One-shot cancellation flag that blocked waiters observe immediately.
///
/// Cancelling drops the only sender, which disconnects every receiver.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    pub fn cancel(&self) {
        lock(&self.trigger).take();
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block for at most `timeout`; `true` if cancelled meanwhile.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.signal.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Receiver that disconnects on cancel, for use inside `select!`.
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
