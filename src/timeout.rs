use std::time::Duration;

use tokio::time::Instant;

/// Keeps track of how much time is left until a deadline.
///
/// Useful when several reads in a row must share one timeout.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutCalculator {
    // `None` if the deadline is too far away to represent: it never expires.
    end: Option<Instant>,
}

impl TimeoutCalculator {
    /// Start counting down from now.
    ///
    /// A timeout such as [`Duration::MAX`] means waiting forever.
    pub fn new(timeout: Duration) -> Self {
        Self {
            end: Instant::now().checked_add(timeout),
        }
    }

    /// The time left until the deadline. Zero if it has passed.
    pub fn time_left_now(&self) -> Duration {
        match self.end {
            Some(end) => end.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    /// Has the deadline passed?
    pub fn expired(&self) -> bool {
        self.time_left_now().is_zero()
    }
}
