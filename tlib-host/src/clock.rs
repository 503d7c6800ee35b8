//! Time source and sleep primitive shared by the capability table and the loop.
//!
//! `wasm_time` reads `Clock::now`, and the driving loop suspends through
//! `Clock::sleep`. Using one object for both keeps guest-visible time consistent
//! with the schedule, including under `ManualClock` where time is virtual.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock: Send {
    /// Time elapsed since the 1970 epoch.
    fn now(&self) -> Duration;

    /// Block the loop for `duration`.
    fn sleep(&mut self, duration: Duration);

    /// Microseconds since the 1970 epoch, as handed to the guest.
    fn now_micros(&self) -> i64 {
        i64::try_from(self.now().as_micros()).unwrap_or(i64::MAX)
    }
}

/// Wall clock; sleeps the thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }

    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Virtual clock: `sleep` advances time instantly.
///
/// Used for deterministic tests and for fast headless runs.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Duration,
    slept: Duration,
}

impl ManualClock {
    /// 2025-01-01T00:00:00Z
    pub const DEFAULT_EPOCH: Duration = Duration::from_secs(1_735_689_600);

    pub fn new(start: Duration) -> Self {
        Self {
            now: start,
            slept: Duration::ZERO,
        }
    }

    /// Advance without counting it as loop sleep.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Total time spent in `sleep`.
    pub fn slept(&self) -> Duration {
        self.slept
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
        self.slept += duration;
    }
}
