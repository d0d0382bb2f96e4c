//! Shared circuit breakers keyed by dependency name
//!
//! Build one registry at startup and hand it (or an `Arc` of it) to the
//! code that talks to dependencies. Every caller asking for the same name
//! gets the same breaker, so they all see the same state.

use crate::{
    circuit::{CircuitBreaker, CircuitStatus},
    config::{BreakerSettings, ReliabilityConfig},
    errors::ConfigError,
};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct CircuitRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: BreakerSettings,
    overrides: std::collections::HashMap<String, BreakerSettings>,
}

impl CircuitRegistry {
    /// Registry creating breakers lazily with `defaults`
    pub fn new(defaults: BreakerSettings) -> Result<Self, ConfigError> {
        defaults.to_config()?.validate()?;
        Ok(Self {
            breakers: DashMap::new(),
            defaults,
            overrides: Default::default(),
        })
    }

    /// Registry using the `[breaker]` defaults and `[breakers.*]` overrides
    ///
    /// Every overridden breaker is created up front.
    pub fn from_config(config: &ReliabilityConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Self {
            breakers: DashMap::new(),
            defaults: config.breaker.clone(),
            overrides: config.breakers.clone(),
        };
        for (name, settings) in &config.breakers {
            registry.register(settings.build(name.as_str())?);
        }
        Ok(registry)
    }

    /// The breaker for `name`, created on first use
    pub fn get_or_create(&self, name: &str) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.breakers.get(name) {
            return Ok(Arc::clone(existing.value()));
        }

        let settings = self.overrides.get(name).unwrap_or(&self.defaults);
        let breaker = Arc::new(settings.build(name)?);

        // Another caller may have inserted while we were building
        let entry = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(circuit = %name, "circuit breaker created");
                breaker
            });
        Ok(Arc::clone(entry.value()))
    }

    /// Insert a prebuilt breaker, replacing any existing one with that name
    pub fn register(&self, breaker: CircuitBreaker) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(breaker);
        self.breakers
            .insert(breaker.name().to_string(), Arc::clone(&breaker));
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Status of every breaker, sorted by name
    pub fn statuses(&self) -> Vec<CircuitStatus> {
        let mut statuses: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| entry.value().status())
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
