//! Labeled signals for the observability sink
//!
//! Everything goes through the `metrics` facade, so whichever recorder the
//! host process installs (Prometheus exporter, test recorder, nothing at
//! all) receives the values.
//!
//! # Metrics
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open, by `service`
//! - `circuit_breaker_failures_total` (counter): counted failures, by `service`
//! - `retry_attempts_total` (counter): failed retryable attempts, by `operation`, `attempt`

use crate::circuit::CircuitState;
use metrics::{counter, gauge};

pub const CIRCUIT_STATE: &str = "circuit_breaker_state";
pub const CIRCUIT_FAILURES_TOTAL: &str = "circuit_breaker_failures_total";
pub const RETRY_ATTEMPTS_TOTAL: &str = "retry_attempts_total";

/// Register descriptions with the installed recorder
pub fn describe() {
    metrics::describe_gauge!(
        CIRCUIT_STATE,
        "Circuit breaker state (0=closed, 1=open, 2=half-open)"
    );
    metrics::describe_counter!(CIRCUIT_FAILURES_TOTAL, "Total circuit breaker failures");
    metrics::describe_counter!(RETRY_ATTEMPTS_TOTAL, "Total retry attempts");
}

pub(crate) fn record_state(circuit: &str, state: CircuitState) {
    gauge!(CIRCUIT_STATE, "service" => circuit.to_owned()).set(state.as_gauge());
}

pub(crate) fn record_failure(circuit: &str) {
    counter!(CIRCUIT_FAILURES_TOTAL, "service" => circuit.to_owned()).increment(1);
}

pub(crate) fn record_retry_attempt(operation: &str, attempt: u32) {
    counter!(
        RETRY_ATTEMPTS_TOTAL,
        "operation" => operation.to_owned(),
        "attempt" => attempt.to_string()
    )
    .increment(1);
}
