//! Time sources and the small timer primitives built on them.
//!
//! Everything that depends on wall-clock time reads it through [`Clock`], so
//! tests can drive widgets and the frame loop with a [`ManualClock`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::Mutex;

/// Upper bound on repeat emissions delivered by a single [`RepeatTimer::fire`].
///
/// A stalled host (background tab, debugger pause) drops the surplus instead of
/// replaying a burst of stale events.
pub const MAX_CATCH_UP: u32 = 8;

/// Monotonic time source measured from an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

impl<T> Clock for Arc<T>
where
    T: Clock + ?Sized,
{
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, step: Duration) {
        *self.now.lock() += step;
    }

    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

/// Cancellable fixed-cadence timer.
///
/// Scheduling always replaces the pending deadline, so two schedules never
/// overlap.
#[derive(Debug, Clone)]
pub struct RepeatTimer {
    interval: Duration,
    next_due: Option<Duration>,
}

impl RepeatTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_nanos(1)),
            next_due: None,
        }
    }

    pub fn schedule(&mut self, now: Duration) {
        self.next_due = Some(now + self.interval);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    /// Returns how many intervals elapsed since the last firing and rearms the
    /// timer for the next one.
    pub fn fire(&mut self, now: Duration) -> u32 {
        let Some(due) = self.next_due else {
            return 0;
        };
        if now < due {
            return 0;
        }
        let interval = self.interval.as_nanos();
        let elapsed = (now - due).as_nanos();
        let missed = elapsed / interval + 1;
        let remainder = Duration::from_nanos((elapsed % interval) as u64);
        self.next_due = Some(now + self.interval - remainder);

        if missed > u128::from(MAX_CATCH_UP) {
            warn!(
                "timer fell {missed} intervals behind; dropping {} emission(s)",
                missed - u128::from(MAX_CATCH_UP)
            );
            MAX_CATCH_UP
        } else {
            missed as u32
        }
    }
}

/// Reports activity until `window` has passed without a new [`Debounce::touch`].
#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    last: Option<Duration>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn touch(&mut self, now: Duration) {
        self.last = Some(now);
    }

    pub fn is_active(&self, now: Duration) -> bool {
        self.last
            .map(|last| now.saturating_sub(last) < self.window)
            .unwrap_or(false)
    }
}
