//! Time sources for circuit breakers
//!
//! This module provides two clocks:
//! - `MonotonicClock`: seconds since creation, immune to NTP adjustments
//! - `ManualClock`: advanced explicitly, for deterministic tests

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic time, in seconds, for breaker timestamps
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Seconds elapsed since the clock's anchor point
    fn now(&self) -> f64;
}

/// Clock anchored to an `Instant` taken at construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start_time: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the breaker.
///
/// # Example
///
/// ```rust
/// use reliability_machines::{CircuitBreaker, ManualClock};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let circuit = CircuitBreaker::builder("inventory")
///     .clock(Arc::new(clock.clone()))
///     .build()
///     .unwrap();
///
/// clock.advance(Duration::from_secs(5));
/// assert!(circuit.is_closed());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst)).as_secs_f64()
    }
}
