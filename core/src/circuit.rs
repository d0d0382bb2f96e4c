//! Circuit breaker implementation using state machines
//!
//! The breaker is shared: every method takes `&self` and all bookkeeping
//! happens under one mutex per breaker. The protected operation itself runs
//! outside that lock, so a slow dependency never serializes its callers.
//!
//! ```text
//! Closed   --(failures >= failure_threshold)--> Open
//! Open     --(recovery_timeout elapsed)-------> HalfOpen
//! HalfOpen --(successes >= success_threshold)-> Closed
//! HalfOpen --(any counted failure)------------> Open
//! ```

use crate::{
    callbacks::{Callbacks, Transition},
    classifier::{Classify, FailureKind, KindSet},
    clock::{Clock, MonotonicClock},
    errors::{CircuitError, ConfigError},
    telemetry,
};
use serde::Serialize;
use state_machines::state_machine;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Consecutive counted failures (while Closed) that open the circuit
    pub failure_threshold: usize,

    /// Time the circuit stays Open before letting a probe through
    pub recovery_timeout: Duration,

    /// Successes required in HalfOpen to close the circuit
    pub success_threshold: usize,

    /// Jitter factor for recovery_timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,

    /// Failure kinds that count against the circuit; others pass through
    pub trips_on: KindSet,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            jitter_factor: 0.0,
            trips_on: KindSet::ALL,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold < 1 {
            return Err(ConfigError::below_minimum(
                "failure_threshold",
                1,
                self.failure_threshold,
            ));
        }
        if self.recovery_timeout < Duration::from_millis(1) {
            return Err(ConfigError::below_minimum(
                "recovery_timeout",
                "1ms",
                format!("{:?}", self.recovery_timeout),
            ));
        }
        if self.success_threshold < 1 {
            return Err(ConfigError::below_minimum(
                "success_threshold",
                1,
                self.success_threshold,
            ));
        }
        ConfigError::check_fraction("jitter_factor", self.jitter_factor)
    }
}

/// Public view of the breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric value exported on the state gauge
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn from_machine(name: &str) -> Self {
        match name {
            "Closed" => CircuitState::Closed,
            "Open" => CircuitState::Open,
            "HalfOpen" => CircuitState::HalfOpen,
            other => unreachable!("state machine reported unknown state {other:?}"),
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot for diagnostics and health endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: usize,
    pub success_count: usize,
    /// Breaker clock time of the last counted failure, in seconds
    pub last_failure_at: Option<f64>,
    /// Breaker clock time the circuit last opened, in seconds
    pub opened_at: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Counters {
    pub failure_count: usize,
    pub success_count: usize,
    pub last_failure_at: Option<f64>,
    pub opened_at: Option<f64>,
}

/// Counters shared between the breaker and its state machine guards
#[derive(Debug, Default)]
pub struct CircuitStats {
    counters: RwLock<Counters>,
}

impl CircuitStats {
    pub(crate) fn read(&self) -> Counters {
        *self.counters.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut Counters)) -> Counters {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut counters);
        *counters
    }
}

/// Circuit breaker context - shared data across all states
#[derive(Debug, Clone)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<CircuitStats>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            config: Config::default(),
            clock: Arc::new(MonotonicClock::new()),
            stats: Arc::new(CircuitStats::default()),
        }
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: f64,
    /// Recovery timeout for this opening, jitter already applied
    pub timeout_secs: f64,
}

// Define the circuit breaker state machine with dynamic mode
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen,
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [timeout_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        ctx.stats.read().failure_count >= ctx.config.failure_threshold
    }
}

impl Circuit<HalfOpen> {
    /// A probe failure always reopens, regardless of earlier counts
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        true
    }

    fn should_close(&self, ctx: &CircuitContext) -> bool {
        ctx.stats.read().success_count >= ctx.config.success_threshold
    }
}

impl Circuit<Open> {
    fn timeout_elapsed(&self, ctx: &CircuitContext) -> bool {
        let Some(data) = self.state_data_open() else {
            return true;
        };
        ctx.clock.now() - data.opened_at >= data.timeout_secs
    }
}

/// Draw the recovery timeout for a new opening
fn recovery_timeout_secs(config: &Config) -> f64 {
    if config.jitter_factor > 0.0 {
        let timeout_ms = u64::try_from(config.recovery_timeout.as_millis()).unwrap_or(u64::MAX);
        let policy = chrono_machines::Policy {
            max_attempts: 1,
            base_delay_ms: timeout_ms,
            multiplier: 1.0,
            max_delay_ms: timeout_ms,
        };
        let jittered_ms = policy.calculate_delay(1, config.jitter_factor);
        (jittered_ms as f64) / 1000.0
    } else {
        config.recovery_timeout.as_secs_f64()
    }
}

/// Circuit breaker public API
pub struct CircuitBreaker {
    machine: Mutex<DynamicCircuit>,
    context: CircuitContext,
    callbacks: Callbacks,
}

impl CircuitBreaker {
    /// Create a circuit breaker with the given config (use builder() for hooks)
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self, ConfigError> {
        Self::builder(name).config(config).build()
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    pub(crate) fn with_context_and_callbacks(
        context: CircuitContext,
        callbacks: Callbacks,
    ) -> Self {
        let machine = Mutex::new(DynamicCircuit::new(context.clone()));
        telemetry::record_state(&context.name, CircuitState::Closed);

        Self {
            machine,
            context,
            callbacks,
        }
    }

    /// Execute a blocking operation with circuit breaker protection
    ///
    /// Rejected calls return `CircuitError::Open` without invoking `f`.
    /// Operation errors come back unchanged inside `CircuitError::Execution`.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        E: Classify,
        F: FnOnce() -> Result<T, E>,
    {
        self.admit::<E>()?;
        let result = f();
        self.settle(result)
    }

    /// Execute an async operation with circuit breaker protection
    ///
    /// Same state handling as [`CircuitBreaker::call`]; the future is only
    /// created once the call has been admitted.
    pub async fn call_async<T, E, F, Fut>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        E: Classify,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit::<E>()?;
        let result = f().await;
        self.settle(result)
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_machine(self.lock().current_state())
    }

    /// Current state as `closed`, `open` or `half_open`
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Snapshot of state and counters
    pub fn status(&self) -> CircuitStatus {
        let machine = self.lock();
        let counters = self.context.stats.read();

        CircuitStatus {
            name: self.context.name.clone(),
            state: CircuitState::from_machine(machine.current_state()),
            failure_count: counters.failure_count,
            success_count: counters.success_count,
            last_failure_at: counters.last_failure_at,
            opened_at: counters.opened_at,
        }
    }

    /// Clear all counters and force the circuit back to Closed
    pub fn reset(&self) {
        let change = {
            let mut machine = self.lock();
            let from = CircuitState::from_machine(machine.current_state());

            *machine = DynamicCircuit::new(self.context.clone());
            self.context.stats.update(|c| *c = Counters::default());

            if from == CircuitState::Closed {
                return;
            }
            info!(circuit = %self.context.name, from = %from, "circuit reset");
            self.record_change(from, CircuitState::Closed, self.context.clock.now())
        };
        self.notify(change);
    }

    fn lock(&self) -> MutexGuard<'_, DynamicCircuit> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed, moving Open -> HalfOpen when due
    fn admit<E>(&self) -> Result<(), CircuitError<E>> {
        let change = {
            let mut machine = self.lock();

            if machine.current_state() != "Open" {
                return Ok(());
            }

            if machine.handle(CircuitEvent::AttemptReset).is_err() {
                let opened_at = machine.open_data().map(|d| d.opened_at).unwrap_or(0.0);
                debug!(circuit = %self.context.name, opened_at, "call rejected, circuit is open");
                return Err(CircuitError::Open {
                    circuit: self.context.name.clone(),
                    opened_at,
                });
            }

            self.context.stats.update(|c| c.success_count = 0);
            info!(circuit = %self.context.name, "circuit entering half-open state");
            self.record_change(
                CircuitState::Open,
                CircuitState::HalfOpen,
                self.context.clock.now(),
            )
        };
        self.notify(change);
        Ok(())
    }

    fn settle<T, E: Classify>(&self, result: Result<T, E>) -> Result<T, CircuitError<E>> {
        match result {
            Ok(value) => {
                if let Some(change) = self.on_success() {
                    self.notify(change);
                }
                Ok(value)
            }
            Err(e) => {
                let kind = e.failure_kind();
                if self.context.config.trips_on.contains(kind) {
                    if let Some(change) = self.on_failure(kind) {
                        self.notify(change);
                    }
                } else {
                    debug!(
                        circuit = %self.context.name,
                        kind = %kind,
                        "failure kind not counted by circuit"
                    );
                }
                Err(CircuitError::Execution(e))
            }
        }
    }

    fn on_success(&self) -> Option<StateChange> {
        let mut machine = self.lock();

        match CircuitState::from_machine(machine.current_state()) {
            CircuitState::Closed => {
                self.context.stats.update(|c| c.failure_count = 0);
                None
            }
            CircuitState::HalfOpen => {
                let counters = self.context.stats.update(|c| c.success_count += 1);
                if machine.handle(CircuitEvent::Close).is_err() {
                    return None;
                }
                self.context.stats.update(|c| c.failure_count = 0);
                info!(
                    circuit = %self.context.name,
                    successes = counters.success_count,
                    "circuit recovered, entering closed state"
                );
                Some(self.record_change(
                    CircuitState::HalfOpen,
                    CircuitState::Closed,
                    self.context.clock.now(),
                ))
            }
            // Another caller reopened the circuit while this call was running
            CircuitState::Open => None,
        }
    }

    fn on_failure(&self, kind: FailureKind) -> Option<StateChange> {
        let mut machine = self.lock();
        let now = self.context.clock.now();

        let counters = self.context.stats.update(|c| {
            c.failure_count += 1;
            c.last_failure_at = Some(now);
        });
        telemetry::record_failure(&self.context.name);
        warn!(
            circuit = %self.context.name,
            kind = %kind,
            failures = counters.failure_count,
            threshold = self.context.config.failure_threshold,
            "circuit failure recorded"
        );

        let from = CircuitState::from_machine(machine.current_state());
        if from == CircuitState::Open || machine.handle(CircuitEvent::Trip).is_err() {
            return None;
        }

        let timeout_secs = recovery_timeout_secs(&self.context.config);
        if let Some(data) = machine.open_data_mut() {
            data.opened_at = now;
            data.timeout_secs = timeout_secs;
        }
        self.context.stats.update(|c| c.opened_at = Some(now));
        error!(
            circuit = %self.context.name,
            failures = counters.failure_count,
            from = %from,
            recovery_timeout_secs = timeout_secs,
            "circuit opened"
        );
        Some(self.record_change(from, CircuitState::Open, now))
    }

    /// Publish the new state; called with the machine lock held
    fn record_change(&self, from: CircuitState, to: CircuitState, at: f64) -> StateChange {
        telemetry::record_state(&self.context.name, to);
        StateChange { from, to, at }
    }

    /// Run user hooks; called after the machine lock is released
    fn notify(&self, change: StateChange) {
        self.callbacks.notify(&Transition {
            circuit: &self.context.name,
            from: change.from,
            to: change.to,
            at: change.at,
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct StateChange {
    from: CircuitState,
    to: CircuitState,
    at: f64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("config", &self.context.config)
            .field("state", &self.state())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
