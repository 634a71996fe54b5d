use std::{
    hint,
    sync::atomic::{AtomicU64, Ordering},
    thread,
    time::{Duration, Instant},
};

/// Time source for bounded waits.
pub trait Clock {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
    fn pause(&self, duration: Duration);
}

/// Waits shorter than this are spun instead of handed to the scheduler, whose
/// granularity is far coarser than a frame budget.
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

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

    fn pause(&self, duration: Duration) {
        let until = self.now() + duration;
        if duration > SPIN_THRESHOLD {
            thread::sleep(duration - SPIN_THRESHOLD);
        }
        while self.now() < until {
            hint::spin_loop();
            thread::yield_now();
        }
    }
}

/// A clock that only moves when paused or advanced.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn pause(&self, duration: Duration) {
        self.advance(duration);
    }
}
