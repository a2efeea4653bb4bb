//! Self-rescheduling inactivity timeout.
//!
//! `reset()` only moves the deadline and raises a flag; the timer thread
//! notices on its next wake and goes back to sleep for the remaining time. No
//! OS timer is created or torn down per reset, so resetting on every user
//! interaction stays cheap.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, error, info};

use crate::{error::ScanError, telemetry};

type TimeoutCallback = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutPhase {
    Armed,
    Fired,
    Cancelled,
}

struct TimeoutState {
    phase: TimeoutPhase,
    deadline: Instant,
    reset_pending: bool,
    callback: Option<TimeoutCallback>,
}

struct Shared {
    duration: Duration,
    state: Mutex<TimeoutState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimeoutState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Countdown that runs a callback unless refreshed before its deadline.
///
/// Cloning yields another handle to the same timer, so the callback itself may
/// hold one and call [`reset`](Self::reset) or [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct InactivityTimeout {
    shared: Arc<Shared>,
    handle: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
}

impl InactivityTimeout {
    /// Arm a timer that calls `callback` once `duration` passes without a reset.
    pub fn start<F>(duration: Duration, callback: F) -> Result<Self, ScanError>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            duration,
            state: Mutex::new(TimeoutState {
                phase: TimeoutPhase::Armed,
                deadline: Instant::now() + duration,
                reset_pending: false,
                callback: Some(Box::new(callback)),
            }),
        });

        let worker_shared = shared.clone();
        let handle = telemetry::spawn_thread("inactivity-timeout", move || {
            run_timer(&worker_shared)
        })
        .map_err(|source| ScanError::Spawn {
            name: "inactivity-timeout".to_string(),
            source,
        })?;
        debug!(?duration, "inactivity timeout armed");

        Ok(Self {
            shared,
            handle: Arc::new(Mutex::new(Some(handle))),
        })
    }

    pub fn duration(&self) -> Duration {
        self.shared.duration
    }

    /// Push the deadline to `now + duration`. Returns `false` once fired or cancelled.
    pub fn reset(&self) -> bool {
        let mut state = self.shared.lock();
        if state.phase != TimeoutPhase::Armed {
            return false;
        }
        state.deadline = Instant::now() + self.shared.duration;
        state.reset_pending = true;
        true
    }

    /// Drop the callback so it never runs.
    ///
    /// The timer thread keeps sleeping until the current deadline and then
    /// exits quietly. Returns `false` if the timeout already fired or was
    /// cancelled before.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.lock();
        if state.phase != TimeoutPhase::Armed {
            return false;
        }
        state.phase = TimeoutPhase::Cancelled;
        state.callback = None;
        debug!("inactivity timeout cancelled");
        true
    }

    pub fn phase(&self) -> TimeoutPhase {
        self.shared.lock().phase
    }

    /// Time left until the current deadline while armed.
    pub fn remaining(&self) -> Option<Duration> {
        let state = self.shared.lock();
        (state.phase == TimeoutPhase::Armed)
            .then(|| state.deadline.saturating_duration_since(Instant::now()))
    }

    /// Wait for the timer thread to finish. A cancelled timer finishes at its
    /// last deadline at the latest.
    pub fn join(&self) {
        let handle = {
            let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            // Joining from the callback would wait on ourselves.
            if slot
                .as_ref()
                .is_some_and(|handle| handle.thread().id() == thread::current().id())
            {
                return;
            }
            slot.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("inactivity timeout thread panicked");
            }
        }
    }
}

fn run_timer(shared: &Shared) {
    let mut wait = shared.duration;
    loop {
        thread::sleep(wait);

        let callback = {
            let mut state = shared.lock();
            let Some(callback) = state.callback.take() else {
                debug!("inactivity timeout observed cancellation");
                return;
            };
            if state.reset_pending {
                state.reset_pending = false;
                let remaining = state.deadline.saturating_duration_since(Instant::now());
                if !remaining.is_zero() {
                    state.callback = Some(callback);
                    wait = remaining;
                    continue;
                }
            }
            state.phase = TimeoutPhase::Fired;
            callback
        };

        info!("inactivity timeout elapsed");
        metrics::counter!(telemetry::TIMEOUTS_FIRED_TOTAL).increment(1);
        if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
            error!("inactivity timeout callback panicked");
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    };

    use super::*;

    fn counting(duration: Duration) -> (InactivityTimeout, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timeout = InactivityTimeout::start(duration, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("start timeout");
        (timeout, fired)
    }

    #[test]
    fn fires_once_after_duration_on_timer_thread() {
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();
        let timeout = InactivityTimeout::start(Duration::from_millis(200), move || {
            let name = thread::current().name().map(str::to_owned);
            let _ = tx.send((started.elapsed(), name));
        })
        .expect("start timeout");

        let (elapsed, thread_name) = rx.recv_timeout(Duration::from_secs(2)).expect("fired");
        assert!(elapsed >= Duration::from_millis(200), "fired early: {elapsed:?}");
        assert_eq!(thread_name.as_deref(), Some("inactivity-timeout"));
        timeout.join();
        assert_eq!(timeout.phase(), TimeoutPhase::Fired);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reset_pushes_deadline_out() {
        let (tx, rx) = mpsc::channel();
        let timeout = InactivityTimeout::start(Duration::from_millis(200), move || {
            let _ = tx.send(Instant::now());
        })
        .expect("start timeout");

        let mut last_reset = Instant::now();
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(100));
            last_reset = Instant::now();
            assert!(timeout.reset());
        }

        let fired_at = rx.recv_timeout(Duration::from_secs(2)).expect("fired");
        assert!(fired_at >= last_reset + Duration::from_millis(200));
        timeout.join();
    }

    #[test]
    fn cancel_before_expiry_never_fires() {
        let (timeout, fired) = counting(Duration::from_millis(100));
        assert!(timeout.cancel());
        assert_eq!(timeout.phase(), TimeoutPhase::Cancelled);
        assert!(!timeout.reset());
        timeout.join();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_after_fire_is_a_no_op() {
        let (timeout, fired) = counting(Duration::from_millis(50));
        timeout.join();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timeout.cancel());
        assert!(!timeout.reset());
        assert_eq!(timeout.phase(), TimeoutPhase::Fired);
        assert_eq!(timeout.remaining(), None);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let timeout = InactivityTimeout::start(Duration::from_millis(20), || {
            panic!("logout handler failed");
        })
        .expect("start timeout");
        timeout.join();
        assert_eq!(timeout.phase(), TimeoutPhase::Fired);
    }

    #[test]
    fn callback_may_use_its_own_handle() {
        let (tx, rx) = mpsc::channel();
        let slot: Arc<Mutex<Option<InactivityTimeout>>> = Arc::new(Mutex::new(None));
        let inner_slot = slot.clone();
        let timeout = InactivityTimeout::start(Duration::from_millis(30), move || {
            let handle = inner_slot.lock().expect("slot").clone();
            if let Some(handle) = handle {
                let _ = tx.send((handle.reset(), handle.cancel(), handle.phase()));
            }
        })
        .expect("start timeout");
        *slot.lock().expect("slot") = Some(timeout.clone());

        let (reset, cancel, phase) = rx.recv_timeout(Duration::from_secs(2)).expect("callback ran");
        assert!(!reset);
        assert!(!cancel);
        assert_eq!(phase, TimeoutPhase::Fired);
        timeout.join();
    }
}
