//! Exponential backoff for reconnection

use std::time::Duration;

const INITIAL_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff for reconnection attempts: 0.5s initial, doubling,
/// capped at 30s, no jitter.
pub(crate) struct Backoff {
    current: Duration,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self {
            current: INITIAL_DELAY,
        }
    }

    /// Get the next delay and advance the backoff
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, MAX_DELAY);
        delay
    }

    /// Reset the backoff to the initial delay
    pub(crate) fn reset(&mut self) {
        self.current = INITIAL_DELAY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let mut backoff = Backoff::new();

        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    }

    #[test]
    fn backoff_caps_at_max() {
        let mut backoff = Backoff::new();

        let mut last = Duration::ZERO;
        for _ in 0..10 {
            last = backoff.next_delay();
        }

        assert_eq!(last, Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut backoff = Backoff::new();
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();

        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }
}
