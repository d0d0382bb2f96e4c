//! Error types for circuit breaker operations and configuration

use crate::classifier::{Classify, FailureKind};
use std::error::Error;
use thiserror::Error;

/// Errors that can occur during circuit breaker operations
#[derive(Debug, Error)]
pub enum CircuitError<E = Box<dyn Error + Send + Sync>> {
    /// Circuit is open, the operation was never invoked
    #[error("Circuit '{circuit}' is open (opened at {opened_at})")]
    Open { circuit: String, opened_at: f64 },
    /// The wrapped operation failed; the error is passed through untouched
    #[error("{0}")]
    Execution(E),
}

impl<E> CircuitError<E> {
    /// True when the call was rejected without invoking the operation
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// Name of the breaker that rejected the call, if any
    pub fn circuit(&self) -> Option<&str> {
        match self {
            CircuitError::Open { circuit, .. } => Some(circuit),
            CircuitError::Execution(_) => None,
        }
    }

    /// The operation's own error, if the operation ran and failed
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open { .. } => None,
        }
    }
}

impl<E: Classify> Classify for CircuitError<E> {
    fn failure_kind(&self) -> FailureKind {
        match self {
            CircuitError::Open { .. } => FailureKind::CircuitOpen,
            CircuitError::Execution(e) => e.failure_kind(),
        }
    }
}

/// Invalid construction parameters, reported when a policy, breaker or
/// objective is built and never at call time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be >= {min} (got {value})")]
    BelowMinimum {
        field: &'static str,
        min: String,
        value: String,
    },
    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{lower} must be <= {upper}")]
    Ordering {
        lower: &'static str,
        upper: &'static str,
    },
    #[error("invalid configuration: {0}")]
    Parse(String),
    #[error("failed to read configuration file {path}: {reason}")]
    Io { path: String, reason: String },
}

impl ConfigError {
    pub(crate) fn below_minimum(
        field: &'static str,
        min: impl ToString,
        value: impl ToString,
    ) -> Self {
        ConfigError::BelowMinimum {
            field,
            min: min.to_string(),
            value: value.to_string(),
        }
    }

    /// Check that `value` lies in `[0.0, 1.0]`
    pub(crate) fn check_fraction(field: &'static str, value: f64) -> Result<(), Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                field,
                min: 0.0,
                max: 1.0,
                value,
            })
        }
    }
}
