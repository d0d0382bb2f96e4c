//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::{Callbacks, Transition},
    circuit::{CircuitBreaker, CircuitContext, CircuitStats, Config},
    classifier::KindSet,
    clock::{Clock, MonotonicClock},
    errors::ConfigError,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder {
    name: String,
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            clock: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Replace the whole configuration at once
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the failure threshold (counted failures that open the circuit)
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before a probe is allowed
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    /// Set the success threshold (successes needed to close from half-open)
    pub fn success_threshold(mut self, threshold: usize) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Set which failure kinds count against the circuit
    ///
    /// Errors of any other kind are returned to the caller without touching
    /// the breaker's counters.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use reliability_machines::{CircuitBreaker, FailureKind, KindSet};
    ///
    /// let circuit = CircuitBreaker::builder("api")
    ///     .trips_on(KindSet::TRANSIENT.with(FailureKind::Server))
    ///     .build()
    ///     .unwrap();
    /// assert!(circuit.is_closed());
    /// ```
    pub fn trips_on(mut self, kinds: KindSet) -> Self {
        self.config.trips_on = kinds;
        self
    }

    /// Use a custom time source (defaults to `MonotonicClock`)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Add a callback that sees every transition with its source state
    pub fn on_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(&Transition<'_>) + Send + Sync + 'static,
    {
        self.callbacks.on_transition.push(Arc::new(f));
        self
    }

    /// Validate the configuration and build the circuit breaker
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        self.config.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let context = CircuitContext {
            name: self.name,
            config: self.config,
            clock,
            stats: Arc::new(CircuitStats::default()),
        };

        Ok(CircuitBreaker::with_context_and_callbacks(
            context,
            self.callbacks,
        ))
    }
}
