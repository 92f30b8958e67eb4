use std::time::Duration;

/// Exponential delay between two reconnection attempts
///
/// The delay doubles after each failure, up to `max_delay`, and goes back to `initial_delay`
/// once a connection succeeds.
///
/// ```
/// use mqttdevice::backoff::Backoff;
/// use std::time::Duration;
///
/// let mut backoff = Backoff::default();
/// assert_eq!(backoff.next_sleep(), Duration::from_secs(1));
/// assert_eq!(backoff.next_sleep(), Duration::from_secs(2));
///
/// backoff.reset();
/// assert_eq!(backoff.next_sleep(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Backoff {
        Backoff {
            initial_delay,
            max_delay,
            attempt: 0,
        }
    }

    /// Returns the delay to wait before the next attempt
    pub fn next_sleep(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt.min(16));
        self.attempt = self.attempt.saturating_add(1);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Restarts from the initial delay
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capped() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_sleep().as_secs()).collect();

        assert_eq!(delays, [1, 2, 4, 8, 16, 32, 60, 60, 60, 60]);
    }

    #[test]
    fn test_never_zero() {
        let mut backoff = Backoff::default();
        for _ in 0..100 {
            assert!(backoff.next_sleep() >= Duration::from_secs(1));
        }
    }
}
