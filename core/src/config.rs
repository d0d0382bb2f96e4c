//! TOML configuration for retry policies and circuit breakers
//!
//! ```toml
//! [retry]
//! max_attempts = 4
//! base_delay_ms = 50
//! retry_on = ["timeout", "connection"]
//!
//! [breaker]
//! failure_threshold = 5
//! recovery_timeout_secs = 30
//!
//! [breakers.payments]
//! failure_threshold = 2
//! trips_on = ["server", "timeout"]
//! ```
//!
//! Every field is optional. Values are only checked when turned into a
//! policy or breaker, so a bad file fails at startup, not on first call.

use crate::{
    builder::CircuitBuilder,
    circuit::{CircuitBreaker, Config},
    classifier::{FailureKind, KindSet},
    errors::ConfigError,
    retry::{RetryOptions, RetryPolicy},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReliabilityConfig {
    pub retry: RetrySettings,
    /// Defaults for every breaker
    pub breaker: BreakerSettings,
    /// Per-dependency overrides, keyed by breaker name
    pub breakers: HashMap<String, BreakerSettings>,
}

impl ReliabilityConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Check every section, including all breaker overrides
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.to_policy()?;
        self.breaker.to_config()?.validate()?;
        for settings in self.breakers.values() {
            settings.to_config()?.validate()?;
        }
        Ok(())
    }

    /// Settings for a named breaker, falling back to the defaults
    pub fn breaker_settings(&self, name: &str) -> &BreakerSettings {
        self.breakers.get(name).unwrap_or(&self.breaker)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
    /// Failure kinds worth retrying; every kind when unset
    pub retry_on: Option<Vec<FailureKind>>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: true,
            retry_on: None,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> Result<RetryPolicy, ConfigError> {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
            self.jitter,
        )
    }

    pub fn retry_on(&self) -> KindSet {
        kind_set(self.retry_on.as_deref())
    }

    /// Call options for `operation` carrying the configured retryable kinds
    pub fn options<'a, E>(&self, operation: impl Into<String>) -> RetryOptions<'a, E> {
        RetryOptions::new(operation).retry_on(self.retry_on())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    pub failure_threshold: usize,
    pub recovery_timeout_secs: f64,
    pub success_threshold: usize,
    pub jitter_factor: f64,
    /// Failure kinds that count against the circuit; every kind when unset
    pub trips_on: Option<Vec<FailureKind>>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let config = Config::default();
        Self {
            failure_threshold: config.failure_threshold,
            recovery_timeout_secs: config.recovery_timeout.as_secs_f64(),
            success_threshold: config.success_threshold,
            jitter_factor: config.jitter_factor,
            trips_on: None,
        }
    }
}

impl BreakerSettings {
    pub fn to_config(&self) -> Result<Config, ConfigError> {
        let recovery_timeout = Duration::try_from_secs_f64(self.recovery_timeout_secs)
            .map_err(|_| {
                ConfigError::below_minimum("recovery_timeout_secs", 0.001, self.recovery_timeout_secs)
            })?;

        Ok(Config {
            failure_threshold: self.failure_threshold,
            recovery_timeout,
            success_threshold: self.success_threshold,
            jitter_factor: self.jitter_factor,
            trips_on: kind_set(self.trips_on.as_deref()),
        })
    }

    /// Builder preloaded with these settings, for adding hooks or a clock
    pub fn builder(&self, name: impl Into<String>) -> Result<CircuitBuilder, ConfigError> {
        Ok(CircuitBreaker::builder(name).config(self.to_config()?))
    }

    pub fn build(&self, name: impl Into<String>) -> Result<CircuitBreaker, ConfigError> {
        self.builder(name)?.build()
    }
}

fn kind_set(kinds: Option<&[FailureKind]>) -> KindSet {
    kinds.map_or(KindSet::ALL, KindSet::of)
}
