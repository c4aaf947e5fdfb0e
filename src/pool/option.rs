//! Pool sizing and lifecycle options

use std::time::Duration;

use crate::error::{PoolError, Result};

use super::RetryPolicy;

/// Default age after which a connection is refreshed before reuse
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// Default period of the background idle-trim sweep
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Default share of the excess idle connections closed per sweep
pub const DEFAULT_TRIM_RATIO: f64 = 0.1;

/// Immutable configuration of a [`ConnectionPool`](super::ConnectionPool).
///
/// `max_idle` bounds the total number of connections (idle and busy) the
/// pool holds at once; `min_idle` is the floor the pool warms up to and
/// never trims below.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolOption {
    name: String,
    min_idle: usize,
    max_idle: usize,
    max_age: Duration,
    check_interval: Duration,
    trim_ratio: f64,
    retry: RetryPolicy,
}

impl PoolOption {
    /// Create a validated option with default age, interval and retry policy.
    pub fn new(min_idle: usize, max_idle: usize) -> Result<Self> {
        let option = Self {
            name: "default".to_string(),
            min_idle,
            max_idle,
            max_age: DEFAULT_MAX_AGE,
            check_interval: DEFAULT_CHECK_INTERVAL,
            trim_ratio: DEFAULT_TRIM_RATIO,
            retry: RetryPolicy::default(),
        };
        option.validate()?;
        Ok(option)
    }

    /// Set the pool name used in logs and metric labels
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    pub fn with_trim_ratio(mut self, trim_ratio: f64) -> Self {
        self.trim_ratio = trim_ratio;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check every invariant; the pool calls this again on construction.
    pub fn validate(&self) -> Result<()> {
        if self.max_idle == 0 {
            return Err(PoolError::Configuration(
                "max_idle must be greater than 0".to_string(),
            ));
        }
        if self.max_idle < self.min_idle {
            return Err(PoolError::Configuration(format!(
                "max_idle ({}) cannot be less than min_idle ({})",
                self.max_idle, self.min_idle
            )));
        }
        if self.max_age.is_zero() {
            return Err(PoolError::Configuration(
                "max_age must be positive".to_string(),
            ));
        }
        if self.check_interval.is_zero() {
            return Err(PoolError::Configuration(
                "check_interval must be positive".to_string(),
            ));
        }
        if !(self.trim_ratio > 0.0 && self.trim_ratio <= 1.0) {
            return Err(PoolError::Configuration(format!(
                "trim_ratio must be within (0, 1], got {}",
                self.trim_ratio
            )));
        }
        self.retry.validate().map_err(PoolError::Configuration)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn trim_ratio(&self) -> f64 {
        self.trim_ratio
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Number of idle connections one sweep should close.
    ///
    /// Only a fraction of the excess above `min_idle` is trimmed per sweep so
    /// that bursty load does not cause connections to be opened and closed in
    /// rapid succession.
    pub fn trim_count(&self, idle_count: usize) -> usize {
        let excess = idle_count.saturating_sub(self.min_idle);
        if excess == 0 {
            return 0;
        }
        let count = (excess as f64 * self.trim_ratio).ceil() as usize;
        count.clamp(1, excess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let option = PoolOption::new(2, 4).unwrap();
        assert_eq!(option.min_idle(), 2);
        assert_eq!(option.max_idle(), 4);
        assert_eq!(option.max_age(), Duration::from_secs(300));
        assert_eq!(option.check_interval(), Duration::from_secs(60));
        assert_eq!(option.trim_ratio(), 0.1);
        assert_eq!(option.retry().attempts, 3);
        assert_eq!(option.name(), "default");
    }

    #[test]
    fn test_max_idle_below_min_idle_rejected() {
        let err = PoolOption::new(5, 4).unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
        assert!(err.to_string().contains("min_idle"));
    }

    #[test]
    fn test_zero_max_idle_rejected() {
        assert!(matches!(
            PoolOption::new(0, 0),
            Err(PoolError::Configuration(_))
        ));
    }

    #[test]
    fn test_equal_bounds_allowed() {
        assert!(PoolOption::new(3, 3).is_ok());
        assert!(PoolOption::new(0, 1).is_ok());
    }

    #[test]
    fn test_setters_are_checked_by_validate() {
        let option = PoolOption::new(0, 2).unwrap().with_max_age(Duration::ZERO);
        assert!(option.validate().is_err());

        let option = PoolOption::new(0, 2).unwrap().with_trim_ratio(1.5);
        assert!(option.validate().is_err());

        let option = PoolOption::new(0, 2)
            .unwrap()
            .with_check_interval(Duration::from_millis(10))
            .with_trim_ratio(1.0);
        assert!(option.validate().is_ok());
    }

    #[test]
    fn test_trim_count() {
        let option = PoolOption::new(2, 20).unwrap();
        // ceil((10 - 2) * 0.1) = 1
        assert_eq!(option.trim_count(10), 1);
        // ceil((20 - 2) * 0.1) = 2
        assert_eq!(option.trim_count(20), 2);
        assert_eq!(option.trim_count(2), 0);
        assert_eq!(option.trim_count(1), 0);

        let option = option.with_trim_ratio(1.0);
        assert_eq!(option.trim_count(10), 8);
    }
}
