//! Injectable clocks.
//!
//! Every time-gated decision in the editing core (merge window, quiet window,
//! settle and no-signal deadlines, status polling) reads time through the
//! [`Clock`] trait, so tests and edit scripts can drive time by hand with a
//! [`FakeClock`].

use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds
pub trait Clock {
    /// Current time in milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Snapshot of a fake clock, for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockReading {
    /// Time in milliseconds
    pub time_ms: u64,
    /// Total milliseconds advanced since creation
    pub advanced_ms: u64,
}

/// Manually driven clock for deterministic tests
///
/// Time only moves when [`FakeClock::advance_ms`] or [`FakeClock::set_ms`]
/// is called. Interior atomics let one clock be shared (`Arc<FakeClock>`)
/// between a transaction manager and a verifier.
#[derive(Debug)]
pub struct FakeClock {
    current_ms: AtomicU64,
    origin_ms: u64,
}

impl FakeClock {
    /// Create a fake clock paused at `time_ms`
    #[must_use]
    pub fn new(time_ms: u64) -> Self {
        Self {
            current_ms: AtomicU64::new(time_ms),
            origin_ms: time_ms,
        }
    }

    /// Create a shared fake clock
    #[must_use]
    pub fn shared(time_ms: u64) -> Arc<Self> {
        Arc::new(Self::new(time_ms))
    }

    /// Move time forward
    pub fn advance_ms(&self, ms: u64) {
        self.current_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Move time forward by a duration
    pub fn advance(&self, duration: Duration) {
        self.advance_ms(duration.as_millis() as u64);
    }

    /// Jump to an absolute time. Going backwards is ignored.
    pub fn set_ms(&self, time_ms: u64) {
        self.current_ms.fetch_max(time_ms, Ordering::SeqCst);
    }

    /// Current reading
    #[must_use]
    pub fn reading(&self) -> ClockReading {
        let time_ms = self.now_ms();
        ClockReading {
            time_ms,
            advanced_ms: time_ms.saturating_sub(self.origin_ms),
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clone for FakeClock {
    fn clone(&self) -> Self {
        Self {
            current_ms: AtomicU64::new(self.current_ms.load(Ordering::SeqCst)),
            origin_ms: self.origin_ms,
        }
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_clock_only_moves_when_told() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance_ms(250);
        assert_eq!(clock.now_ms(), 1_250);
        clock.advance(Duration::from_millis(50));
        assert_eq!(clock.reading().advanced_ms, 300);
    }

    #[test]
    fn test_fake_clock_never_goes_backwards() {
        let clock = FakeClock::new(500);
        clock.set_ms(100);
        assert_eq!(clock.now_ms(), 500);
        clock.set_ms(900);
        assert_eq!(clock.now_ms(), 900);
    }

    #[test]
    fn test_shared_clock_is_seen_by_all_handles() {
        let clock = FakeClock::shared(0);
        let other = Arc::clone(&clock);
        clock.advance_ms(42);
        assert_eq!(other.now_ms(), 42);
    }

    #[test]
    fn test_fake_clock_clone_is_independent() {
        let clock = FakeClock::new(10);
        let copy = clock.clone();
        clock.advance_ms(5);
        assert_eq!(copy.now_ms(), 10);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}
