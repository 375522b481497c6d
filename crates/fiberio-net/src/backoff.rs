//! Linear reconnect backoff.

use std::time::Duration;

/// First retry delay.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Added after every failed round.
pub const BACKOFF_STEP: Duration = Duration::from_millis(100);
/// Upper bound for a single delay.
pub const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// Delay sequence 100ms, 200ms, ... 1000ms, 1000ms, ...
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new() -> Self {
        Self { current: INITIAL_BACKOFF }
    }

    /// Delay for this round; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current + BACKOFF_STEP).min(MAX_BACKOFF);
        delay
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence() {
        let mut b = ReconnectBackoff::new();
        let got: Vec<u64> = (0..12).map(|_| b.next_delay().as_millis() as u64).collect();
        assert_eq!(
            got,
            vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000, 1000, 1000]
        );
    }

    #[test]
    fn test_monotonic_and_capped() {
        let mut b = ReconnectBackoff::new();
        let mut prev = Duration::ZERO;
        for _ in 0..1000 {
            let d = b.next_delay();
            assert!(d >= prev);
            assert!(d <= MAX_BACKOFF);
            prev = d;
        }
    }
}
