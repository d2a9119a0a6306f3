//! Exponential-backoff policy for bus reconnection.

use std::time::Duration;

/// Smallest delay the backoff grows from.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`]. A zero delay
/// grows from one millisecond.
#[must_use]
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let current = current.max(MIN_DELAY);
    let next_ms = (current.as_millis() as f64 * config.multiplier.max(1.0)) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_delay_doubles() {
        let config = ReconnectConfig::default();
        assert_eq!(
            next_delay(Duration::from_secs(1), &config),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_next_delay_clamps_at_max() {
        let config = ReconnectConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(
            next_delay(Duration::from_secs(8), &config),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_multiplier_below_one_never_shrinks() {
        let config = ReconnectConfig {
            multiplier: 0.5,
            ..Default::default()
        };
        assert_eq!(
            next_delay(Duration::from_secs(4), &config),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_zero_initial_delay_grows() {
        let config = ReconnectConfig {
            initial_delay: Duration::ZERO,
            ..Default::default()
        };
        let mut delay = config.initial_delay;
        for _ in 0..10 {
            delay = next_delay(delay, &config);
        }
        assert_eq!(delay, Duration::from_millis(1024));
    }

    #[test]
    fn test_full_backoff_sequence() {
        let config = ReconnectConfig::default();
        let mut delay = config.initial_delay;
        let expected = [1, 2, 4, 8, 16, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &config);
        }
    }
}
