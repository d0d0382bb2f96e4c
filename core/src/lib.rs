//! ReliabilityMachines - retries, circuit breakers and SLO targets for
//! calls to remote dependencies
//!
//! This crate provides:
//! - A retry policy with capped exponential backoff and optional jitter
//! - A circuit breaker state machine (Closed → Open → HalfOpen → Closed)
//! - A registry sharing one breaker per named dependency
//! - Per-endpoint service level objectives with a text summary
//!
//! Errors describe themselves through [`Classify`]; policies decide what to
//! retry and what to count using [`KindSet`]s of [`FailureKind`]s.
//!
//! # Example
//!
//! ```rust
//! use reliability_machines::{
//!     CircuitBreaker, Classify, FailureKind, KindSet, RetryOptions, RetryPolicy,
//! };
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct Timeout;
//!
//! impl std::fmt::Display for Timeout {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("timed out")
//!     }
//! }
//!
//! impl Classify for Timeout {
//!     fn failure_kind(&self) -> FailureKind {
//!         FailureKind::Timeout
//!     }
//! }
//!
//! let circuit = CircuitBreaker::builder("payment_api")
//!     .failure_threshold(5)
//!     .recovery_timeout(Duration::from_secs(30))
//!     .on_open(|name| println!("Circuit {} opened!", name))
//!     .build()
//!     .unwrap();
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(10), 2.0, false)
//!     .unwrap();
//!
//! let options = RetryOptions::new("charge")
//!     .retry_on(KindSet::TRANSIENT.with(FailureKind::CircuitOpen));
//! let result = policy.execute(options, || circuit.call(|| Ok::<_, Timeout>("charged")));
//!
//! assert_eq!(result.unwrap(), "charged");
//! assert!(circuit.is_closed());
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod errors;
pub mod registry;
pub mod retry;
pub mod slo;
pub mod telemetry;

pub use builder::CircuitBuilder;
pub use callbacks::Transition;
pub use circuit::{CircuitBreaker, CircuitState, CircuitStatus, Config};
pub use classifier::{Classify, FailureKind, KindSet};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{BreakerSettings, ReliabilityConfig, RetrySettings};
pub use errors::{CircuitError, ConfigError};
pub use registry::CircuitRegistry;
pub use retry::{RetryOptions, RetryPolicy};
pub use slo::{
    format_summary, objective_for_endpoint, AvailabilitySli, ErrorRateSli, LatencySli, Observation,
    Percentile, ServiceLevelObjective, SliType, SloRegistry, SloRegistryBuilder, ThroughputSli,
};
