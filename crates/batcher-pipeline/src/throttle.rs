//! Throttling delay between requests after the service pushes back.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

/// Exponential, jittered delay applied before the next request whenever the
/// previous one was throttled. Reset by any unthrottled response.
pub(crate) struct Throttle {
    backoff: Option<ExponentialBackoff>,
    pending: Option<Duration>,
}

impl Throttle {
    /// A zero `initial` delay disables throttling waits.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let backoff = (!initial.is_zero()).then(|| ExponentialBackoff {
            initial_interval: initial,
            current_interval: initial,
            max_interval: max.max(initial),
            max_elapsed_time: None,
            ..Default::default()
        });
        Self {
            backoff,
            pending: None,
        }
    }

    /// Record whether the last response was throttled.
    pub fn record(&mut self, throttled: bool) {
        let Some(backoff) = self.backoff.as_mut() else {
            return;
        };
        if throttled {
            self.pending = backoff.next_backoff();
        } else {
            backoff.reset();
            self.pending = None;
        }
    }

    /// Delay owed before the next request, if any. Consumes it.
    pub fn take_delay(&mut self) -> Option<Duration> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_when_initial_is_zero() {
        let mut throttle = Throttle::new(Duration::ZERO, Duration::from_secs(1));
        throttle.record(true);
        assert_eq!(throttle.take_delay(), None);
    }

    #[test]
    fn test_throttled_response_owes_a_delay() {
        let mut throttle = Throttle::new(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(throttle.take_delay(), None);

        throttle.record(true);
        let delay = throttle.take_delay().unwrap();
        // Default randomization factor is 0.5 around the initial interval.
        assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(150));
        assert_eq!(throttle.take_delay(), None);
    }

    #[test]
    fn test_delay_is_capped() {
        let mut throttle = Throttle::new(Duration::from_millis(100), Duration::from_millis(200));
        for _ in 0..10 {
            throttle.record(true);
        }
        let delay = throttle.take_delay().unwrap();
        // Cap plus at most 50% jitter.
        assert!(delay <= Duration::from_millis(300));
    }

    #[test]
    fn test_success_resets() {
        let mut throttle = Throttle::new(Duration::from_millis(100), Duration::from_secs(10));
        throttle.record(true);
        throttle.record(false);
        assert_eq!(throttle.take_delay(), None);

        throttle.record(true);
        let delay = throttle.take_delay().unwrap();
        assert!(delay <= Duration::from_millis(150));
    }
}
