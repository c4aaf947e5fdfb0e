//! Bounded retry policy for reconnect and liveness probes

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts (including the first)
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay between attempts in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Growth factor applied to the delay after each attempt (1.0 = fixed)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    #[serde(default)]
    pub jitter_factor: f64,
}

fn default_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    100
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_max_delay_ms() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between a fixed number of attempts
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay_ms: delay.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Start a fresh backoff sequence for one retry loop
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.clone())
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.attempts == 0 {
            return Err("retry attempts must be at least 1".to_string());
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(format!(
                "retry jitter_factor must be within 0.0..=1.0, got {}",
                self.jitter_factor
            ));
        }
        Ok(())
    }
}

/// Delay calculator for a single retry loop
pub struct Backoff {
    policy: RetryPolicy,
    current_delay_ms: u64,
    attempt: u32,
}

impl Backoff {
    fn new(policy: RetryPolicy) -> Self {
        let initial = policy.delay_ms;
        Self {
            policy,
            current_delay_ms: initial,
            attempt: 0,
        }
    }

    /// Get the delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let base_delay = (self.current_delay_ms as f64).min(self.policy.max_delay_ms as f64);

        // Apply jitter only if jitter_factor > 0
        let final_delay = if self.policy.jitter_factor > 0.0 && base_delay > 0.0 {
            let jitter_range = base_delay * self.policy.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..jitter_range);
            (base_delay + jitter).max(0.0) as u64
        } else {
            base_delay as u64
        };

        let grown = self.current_delay_ms as f64 * self.policy.multiplier;
        self.current_delay_ms = grown.min(self.policy.max_delay_ms as f64) as u64;

        Duration::from_millis(final_delay)
    }

    /// Number of delays handed out so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_fixed_short_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);

        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.attempt(), 2);
    }

    #[test]
    fn test_exponential_growth_caps_at_max() {
        let policy = RetryPolicy {
            attempts: 10,
            delay_ms: 1000,
            multiplier: 10.0,
            max_delay_ms: 5000,
            jitter_factor: 0.0,
        };
        let mut backoff = policy.backoff();

        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_stays_within_range() {
        let policy = RetryPolicy {
            jitter_factor: 0.5,
            ..RetryPolicy::fixed(5, Duration::from_millis(200))
        };
        let mut backoff = policy.backoff();

        for _ in 0..20 {
            let delay = backoff.next_delay().as_millis();
            assert!((100..=300).contains(&delay));
        }
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let policy = RetryPolicy::fixed(0, Duration::from_millis(10));
        assert!(policy.validate().is_err());

        let policy = RetryPolicy {
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());

        assert!(RetryPolicy::default().validate().is_ok());
    }
}
