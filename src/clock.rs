//! Clock abstraction for playback scheduling.
//!
//! The scheduler needs a monotonic time source it can compare scheduled
//! start times against; tests need to advance that source manually.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Trait abstracting time access for testability.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real system clock using `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Mock clock for testing that allows manual time advancement.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Creates a new mock clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Advances the mock clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut current) = self.current.lock() {
            *current += duration;
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.current
            .lock()
            .map(|current| *current)
            .unwrap_or_else(|_| Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn mock_clock_advances_manually() {
        let clock = MockClock::new();
        let start = clock.now();

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::from_millis(250));

        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now() - start, Duration::from_millis(1250));
    }

    #[test]
    fn mock_clock_is_stable_without_advance() {
        let clock = MockClock::new();
        let first = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.now(), first);
    }

    #[test]
    fn mock_clock_clones_share_time() {
        let clock = MockClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_secs(2));
        assert_eq!(other.now(), clock.now());
    }
}
