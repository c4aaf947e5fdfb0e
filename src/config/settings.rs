use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::backend::BackendConfig;
use crate::error::PoolError;
use crate::pool::{PoolOption, RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub probe: ProbeSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    /// Pool name used in logs and metric labels
    #[serde(default = "default_pool_name")]
    pub name: String,
    #[serde(default = "default_min_idle")]
    pub min_idle: usize,
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
    /// Age in seconds after which a connection is refreshed before reuse
    #[serde(default = "default_max_age_seconds")]
    pub max_age_seconds: f64,
    /// Idle-trim sweep period in seconds
    #[serde(default = "default_check_interval_seconds")]
    pub check_interval_seconds: f64,
    /// Share of the excess idle connections closed per sweep
    #[serde(default = "default_trim_ratio")]
    pub trim_ratio: f64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    /// Periodically borrow and return a connection
    #[serde(default = "default_probe_enabled")]
    pub enabled: bool,
    /// Probe interval in seconds
    #[serde(default = "default_probe_interval")]
    pub interval_seconds: u64,
}

fn default_pool_name() -> String {
    "default".to_string()
}

fn default_min_idle() -> usize {
    2
}

fn default_max_idle() -> usize {
    10
}

fn default_max_age_seconds() -> f64 {
    300.0 // 5 minutes
}

fn default_check_interval_seconds() -> f64 {
    60.0 // 1 minute
}

fn default_trim_ratio() -> f64 {
    0.1
}

fn default_probe_enabled() -> bool {
    true
}

fn default_probe_interval() -> u64 {
    10
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("pool.name", "default")?
            .set_default("pool.min_idle", 2)?
            .set_default("pool.max_idle", 10)?
            .set_default("pool.max_age_seconds", 300.0)?
            .set_default("pool.check_interval_seconds", 60.0)?
            .set_default("backend.kind", "redis")?
            .set_default("probe.enabled", true)?
            .set_default("probe.interval_seconds", 10)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // DBPOOL__POOL__MAX_IDLE, DBPOOL__BACKEND__URL, etc.
            .add_source(
                Environment::with_prefix("DBPOOL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl PoolSettings {
    /// Convert into a validated [`PoolOption`].
    pub fn to_option(&self) -> Result<PoolOption, PoolError> {
        let max_age = seconds("pool.max_age_seconds", self.max_age_seconds)?;
        let check_interval = seconds("pool.check_interval_seconds", self.check_interval_seconds)?;

        let option = PoolOption::new(self.min_idle, self.max_idle)?
            .with_name(self.name.clone())
            .with_max_age(max_age)
            .with_check_interval(check_interval)
            .with_trim_ratio(self.trim_ratio)
            .with_retry(self.retry.clone());
        option.validate()?;
        Ok(option)
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration, PoolError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| PoolError::Configuration(format!("{} = {}: {}", key, value, e)))
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            min_idle: default_min_idle(),
            max_idle: default_max_idle(),
            max_age_seconds: default_max_age_seconds(),
            check_interval_seconds: default_check_interval_seconds(),
            trim_ratio: default_trim_ratio(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            enabled: default_probe_enabled(),
            interval_seconds: default_probe_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let pool = PoolSettings::default();
        assert_eq!(pool.min_idle, 2);
        assert_eq!(pool.max_idle, 10);

        let option = pool.to_option().unwrap();
        assert_eq!(option.max_age(), Duration::from_secs(300));
        assert_eq!(option.check_interval(), Duration::from_secs(60));
        assert_eq!(option.retry().attempts, 3);
    }

    #[test]
    fn test_fractional_seconds() {
        let pool = PoolSettings {
            max_age_seconds: 0.5,
            ..Default::default()
        };
        let option = pool.to_option().unwrap();
        assert_eq!(option.max_age(), Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let pool = PoolSettings {
            min_idle: 5,
            max_idle: 2,
            ..Default::default()
        };
        assert!(matches!(pool.to_option(), Err(PoolError::Configuration(_))));

        let pool = PoolSettings {
            max_age_seconds: -1.0,
            ..Default::default()
        };
        let err = pool.to_option().unwrap_err();
        assert!(err.to_string().contains("pool.max_age_seconds"));

        let pool = PoolSettings {
            check_interval_seconds: 0.0,
            ..Default::default()
        };
        assert!(pool.to_option().is_err());
    }

    #[test]
    fn test_deserialize_from_config_source() {
        let config = Config::builder()
            .add_source(config::File::from_str(
                r#"
                [pool]
                name = "orders"
                min_idle = 1
                max_idle = 4
                max_age_seconds = 120

                [pool.retry]
                attempts = 5

                [backend]
                kind = "postgres"
                host = "db"
                database = "orders"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.pool.name, "orders");
        assert_eq!(settings.pool.retry.attempts, 5);
        assert_eq!(settings.pool.retry.delay_ms, 100);
        assert!(settings.probe.enabled);
        assert!(matches!(settings.backend, BackendConfig::Postgres(ref o) if o.host == "db"));
    }
}
