//! In-process sliding window for burst limiting.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding window of admitted request timestamps for one key.
///
/// Admits while fewer than `limit` samples are retained. Once full, a request
/// is admitted only if the oldest retained sample is at least `window` old,
/// in which case that sample makes room for the new one. The window never
/// holds more than `limit` samples.
///
/// # Example
/// ```
/// use gateway_admission::domain::window::SlidingWindow;
/// use std::time::{Duration, Instant};
///
/// let mut window = SlidingWindow::new();
/// let start = Instant::now();
/// let ten = Duration::from_secs(10);
///
/// assert!(window.try_admit(start, 2, ten));
/// assert!(window.try_admit(start, 2, ten));
/// assert!(!window.try_admit(start + Duration::from_secs(1), 2, ten));
/// assert!(window.try_admit(start + ten, 2, ten));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    samples: VecDeque<Instant>,
    last_seen: Option<Instant>,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request at `now` and decide whether to admit it.
    pub fn try_admit(&mut self, now: Instant, limit: u32, window: Duration) -> bool {
        self.last_seen = Some(now);
        let limit = limit as usize;

        // A lowered limit leaves surplus samples behind; drop the oldest.
        while self.samples.len() > limit {
            self.samples.pop_front();
        }

        if self.samples.len() < limit {
            self.samples.push_back(now);
            return true;
        }

        match self.samples.front() {
            Some(&oldest) if now.saturating_duration_since(oldest) >= window => {
                self.samples.pop_front();
                self.samples.push_back(now);
                true
            }
            _ => false,
        }
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether this window has gone untouched for longer than `expiration`.
    pub fn is_idle(&self, now: Instant, expiration: Duration) -> bool {
        match self.last_seen {
            Some(seen) => now.saturating_duration_since(seen) > expiration,
            None => true,
        }
    }
}
