//! Failure classification
//!
//! Callers tag their errors with a [`FailureKind`] by implementing
//! [`Classify`]. Breakers and retry policies never inspect error types;
//! they only check whether the kind is in a configured [`KindSet`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure categories a caller can assign to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Deadline exceeded talking to the dependency
    Timeout,
    /// Connection refused, reset or dropped
    Connection,
    /// Dependency reported itself unavailable
    Unavailable,
    /// Dependency asked us to slow down
    RateLimited,
    /// Dependency failed while handling the request
    Server,
    /// The request itself was rejected (bad input, not found, ...)
    Client,
    /// A circuit breaker refused to invoke the operation
    CircuitOpen,
    /// Anything else
    Other,
}

impl FailureKind {
    pub const VARIANTS: [FailureKind; 8] = [
        FailureKind::Timeout,
        FailureKind::Connection,
        FailureKind::Unavailable,
        FailureKind::RateLimited,
        FailureKind::Server,
        FailureKind::Client,
        FailureKind::CircuitOpen,
        FailureKind::Other,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Unavailable => "unavailable",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Server => "server",
            FailureKind::Client => "client",
            FailureKind::CircuitOpen => "circuit_open",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for errors that can report which [`FailureKind`] they belong to
///
/// # Examples
///
/// ```rust
/// use reliability_machines::{Classify, FailureKind};
///
/// #[derive(Debug)]
/// enum ApiError {
///     Status(u16),
///     Timeout,
/// }
///
/// impl Classify for ApiError {
///     fn failure_kind(&self) -> FailureKind {
///         match self {
///             ApiError::Timeout => FailureKind::Timeout,
///             ApiError::Status(429) => FailureKind::RateLimited,
///             ApiError::Status(code) if *code >= 500 => FailureKind::Server,
///             ApiError::Status(_) => FailureKind::Client,
///         }
///     }
/// }
///
/// assert_eq!(ApiError::Status(503).failure_kind(), FailureKind::Server);
/// ```
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

impl<T: Classify + ?Sized> Classify for &T {
    fn failure_kind(&self) -> FailureKind {
        (**self).failure_kind()
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn failure_kind(&self) -> FailureKind {
        (**self).failure_kind()
    }
}

/// A set of failure kinds, used both for "retry on" and "trips the circuit"
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindSet(u16);

impl KindSet {
    pub const EMPTY: KindSet = KindSet(0);
    pub const ALL: KindSet = KindSet(0b1111_1111);
    /// Failures that usually go away on their own
    pub const TRANSIENT: KindSet = KindSet::EMPTY
        .with(FailureKind::Timeout)
        .with(FailureKind::Connection)
        .with(FailureKind::Unavailable)
        .with(FailureKind::RateLimited);

    pub fn of(kinds: &[FailureKind]) -> Self {
        kinds.iter().fold(Self::EMPTY, |set, kind| set.with(*kind))
    }

    pub const fn with(self, kind: FailureKind) -> Self {
        KindSet(self.0 | kind.bit())
    }

    pub const fn without(self, kind: FailureKind) -> Self {
        KindSet(self.0 & !kind.bit())
    }

    pub const fn contains(self, kind: FailureKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether the error's kind is part of this set
    pub fn matches<E: Classify + ?Sized>(self, error: &E) -> bool {
        self.contains(error.failure_kind())
    }

    pub fn iter(self) -> impl Iterator<Item = FailureKind> {
        FailureKind::VARIANTS
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl Default for KindSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<FailureKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = FailureKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, KindSet::with)
    }
}

impl fmt::Debug for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
