//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Unix time the mock clock reports before any advance.
pub const MOCK_EPOCH_UNIX_SECONDS: u64 = 1_700_000_000;

/// Mock clock for testing.
///
/// Both the monotonic instant and the unix time move together, so the local
/// and the networked limiters observe the same elapsed time.
///
/// # Examples
///
/// ```
/// use gateway_admission::infrastructure::mocks::MockClock;
/// use gateway_admission::application::ports::Clock;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
/// let unix = clock.unix_seconds();
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
/// assert_eq!(clock.unix_seconds(), unix + 10);
/// ```
///
/// # Thread Safety
///
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    start_unix: u64,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific instant.
    pub fn new(start: Instant) -> Self {
        Self::with_unix_start(start, MOCK_EPOCH_UNIX_SECONDS)
    }

    /// Create a mock clock whose unix time starts at `start_unix`.
    pub fn with_unix_start(start: Instant, start_unix: u64) -> Self {
        Self {
            start,
            start_unix,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self
            .elapsed
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *elapsed += duration;
    }

    /// Set the time elapsed since the start.
    pub fn set_elapsed(&self, duration: Duration) {
        let mut elapsed = self
            .elapsed
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *elapsed = duration;
    }

    fn elapsed(&self) -> Duration {
        *self
            .elapsed
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn unix_seconds(&self) -> u64 {
        self.start_unix + self.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock() {
        let start = Instant::now();
        let clock = MockClock::new(start);

        assert_eq!(clock.now(), start);
        assert_eq!(clock.unix_seconds(), MOCK_EPOCH_UNIX_SECONDS);

        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now(), start + Duration::from_secs(10));

        clock.set_elapsed(Duration::from_millis(100_900));
        assert_eq!(clock.now(), start + Duration::from_millis(100_900));
        assert_eq!(clock.unix_seconds(), MOCK_EPOCH_UNIX_SECONDS + 100);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = MockClock::new(Instant::now());
        let other = clock.clone();

        std::thread::spawn(move || other.advance(Duration::from_secs(5)))
            .join()
            .unwrap();
        assert_eq!(clock.unix_seconds(), MOCK_EPOCH_UNIX_SECONDS + 5);
    }
}
