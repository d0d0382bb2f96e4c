//! Service Level Indicators and Objectives
//!
//! Objectives are immutable values validated at construction. The
//! [`SloRegistry`] picks one per endpoint path by substring match:
//! critical patterns first, then non-critical, then the default.

use crate::errors::ConfigError;
use serde::Serialize;
use std::sync::LazyLock;

/// Kinds of Service Level Indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SliType {
    Latency,
    ErrorRate,
    Throughput,
    Availability,
}

impl SliType {
    pub fn as_str(self) -> &'static str {
        match self {
            SliType::Latency => "latency",
            SliType::ErrorRate => "error_rate",
            SliType::Throughput => "throughput",
            SliType::Availability => "availability",
        }
    }
}

impl std::fmt::Display for SliType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values measured over one evaluation window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub latency_percentile: Percentile,
    pub latency_ms: f64,
    pub error_rate: f64,
    pub rate_5xx: f64,
    pub rps: f64,
    pub availability: f64,
}

/// Latency percentiles tracked by [`LatencySli`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Percentile {
    P50,
    P95,
    P99,
    P999,
}

/// Latency targets in milliseconds, non-decreasing by percentile
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySli {
    p50_ms: f64,
    p95_ms: f64,
    p99_ms: f64,
    p999_ms: f64,
}

impl LatencySli {
    pub fn new(p50_ms: f64, p95_ms: f64, p99_ms: f64, p999_ms: f64) -> Result<Self, ConfigError> {
        if !(p50_ms <= p95_ms && p95_ms <= p99_ms && p99_ms <= p999_ms) {
            return Err(ConfigError::Ordering {
                lower: "lower latency percentile",
                upper: "higher latency percentile",
            });
        }
        if p50_ms < 0.0 {
            return Err(ConfigError::below_minimum("p50_ms", 0, p50_ms));
        }
        Ok(Self::from_parts(p50_ms, p95_ms, p99_ms, p999_ms))
    }

    const fn from_parts(p50_ms: f64, p95_ms: f64, p99_ms: f64, p999_ms: f64) -> Self {
        Self {
            p50_ms,
            p95_ms,
            p99_ms,
            p999_ms,
        }
    }

    pub fn target_ms(&self, percentile: Percentile) -> f64 {
        match percentile {
            Percentile::P50 => self.p50_ms,
            Percentile::P95 => self.p95_ms,
            Percentile::P99 => self.p99_ms,
            Percentile::P999 => self.p999_ms,
        }
    }
}

/// Error budget as fractions of all requests
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorRateSli {
    max_error_rate: f64,
    max_5xx_rate: f64,
}

impl ErrorRateSli {
    pub fn new(max_error_rate: f64, max_5xx_rate: f64) -> Result<Self, ConfigError> {
        ConfigError::check_fraction("max_error_rate", max_error_rate)?;
        ConfigError::check_fraction("max_5xx_rate", max_5xx_rate)?;
        Ok(Self::from_parts(max_error_rate, max_5xx_rate))
    }

    const fn from_parts(max_error_rate: f64, max_5xx_rate: f64) -> Self {
        Self {
            max_error_rate,
            max_5xx_rate,
        }
    }

    pub fn max_error_rate(&self) -> f64 {
        self.max_error_rate
    }

    pub fn max_5xx_rate(&self) -> f64 {
        self.max_5xx_rate
    }
}

/// Requests-per-second band the service is sized for
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputSli {
    min_rps: f64,
    max_rps: f64,
}

impl ThroughputSli {
    pub fn new(min_rps: f64, max_rps: f64) -> Result<Self, ConfigError> {
        if min_rps.is_nan() || min_rps < 0.0 {
            return Err(ConfigError::below_minimum("min_rps", 0, min_rps));
        }
        if max_rps.is_nan() || max_rps < 0.0 {
            return Err(ConfigError::below_minimum("max_rps", 0, max_rps));
        }
        if min_rps > max_rps {
            return Err(ConfigError::Ordering {
                lower: "min_rps",
                upper: "max_rps",
            });
        }
        Ok(Self::from_parts(min_rps, max_rps))
    }

    const fn from_parts(min_rps: f64, max_rps: f64) -> Self {
        Self { min_rps, max_rps }
    }

    pub fn min_rps(&self) -> f64 {
        self.min_rps
    }

    pub fn max_rps(&self) -> f64 {
        self.max_rps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AvailabilitySli {
    min_availability: f64,
}

impl AvailabilitySli {
    pub fn new(min_availability: f64) -> Result<Self, ConfigError> {
        ConfigError::check_fraction("min_availability", min_availability)?;
        Ok(Self::from_parts(min_availability))
    }

    const fn from_parts(min_availability: f64) -> Self {
        Self { min_availability }
    }

    pub fn min_availability(&self) -> f64 {
        self.min_availability
    }
}

/// Targets for one class of endpoints over an evaluation window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceLevelObjective {
    name: String,
    description: String,
    window_minutes: u32,
    latency: LatencySli,
    error_rate: ErrorRateSli,
    throughput: ThroughputSli,
    availability: AvailabilitySli,
}

impl ServiceLevelObjective {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        latency: LatencySli,
        error_rate: ErrorRateSli,
        throughput: ThroughputSli,
        availability: AvailabilitySli,
        window_minutes: u32,
    ) -> Result<Self, ConfigError> {
        if window_minutes < 1 {
            return Err(ConfigError::below_minimum("window_minutes", 1, window_minutes));
        }
        Ok(Self {
            name: name.into(),
            description: description.into(),
            latency,
            error_rate,
            throughput,
            availability,
            window_minutes,
        })
    }

    /// General API objective
    pub fn api_default() -> Self {
        Self {
            name: "atlas-api".to_string(),
            description: "Atlas API Service Level Objective".to_string(),
            latency: LatencySli::from_parts(50.0, 200.0, 500.0, 1000.0),
            error_rate: ErrorRateSli::from_parts(0.01, 0.001),
            throughput: ThroughputSli::from_parts(100.0, 10_000.0),
            availability: AvailabilitySli::from_parts(0.999),
            window_minutes: 5,
        }
    }

    /// Stricter objective for auth, payments and similar endpoints
    pub fn critical() -> Self {
        Self {
            name: "critical-endpoints".to_string(),
            description: "SLO for critical endpoints (auth, payments, etc.)".to_string(),
            latency: LatencySli::from_parts(20.0, 100.0, 200.0, 500.0),
            error_rate: ErrorRateSli::from_parts(0.001, 0.0001),
            throughput: ThroughputSli::from_parts(50.0, 5000.0),
            availability: AvailabilitySli::from_parts(0.9999),
            window_minutes: 1,
        }
    }

    /// Relaxed objective for analytics, reporting and batch endpoints
    pub fn non_critical() -> Self {
        Self {
            name: "non-critical-endpoints".to_string(),
            description: "SLO for non-critical endpoints (analytics, reporting, etc.)".to_string(),
            latency: LatencySli::from_parts(100.0, 500.0, 2000.0, 5000.0),
            error_rate: ErrorRateSli::from_parts(0.05, 0.01),
            throughput: ThroughputSli::from_parts(10.0, 1000.0),
            availability: AvailabilitySli::from_parts(0.99),
            window_minutes: 60,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn latency(&self) -> &LatencySli {
        &self.latency
    }

    pub fn error_rate(&self) -> &ErrorRateSli {
        &self.error_rate
    }

    pub fn throughput(&self) -> &ThroughputSli {
        &self.throughput
    }

    pub fn availability(&self) -> &AvailabilitySli {
        &self.availability
    }

    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }

    pub fn latency_target(&self, percentile: Percentile) -> f64 {
        self.latency.target_ms(percentile)
    }

    /// Whether an observed percentile latency is within target
    pub fn meets_latency(&self, percentile: Percentile, observed_ms: f64) -> bool {
        observed_ms <= self.latency_target(percentile)
    }

    pub fn meets_error_rate(&self, error_rate: f64, rate_5xx: f64) -> bool {
        error_rate <= self.error_rate.max_error_rate && rate_5xx <= self.error_rate.max_5xx_rate
    }

    pub fn meets_availability(&self, availability: f64) -> bool {
        availability >= self.availability.min_availability
    }

    pub fn meets_throughput(&self, rps: f64) -> bool {
        (self.throughput.min_rps..=self.throughput.max_rps).contains(&rps)
    }

    /// Indicators the observation misses, in declaration order
    pub fn breaches(&self, observed: &Observation) -> Vec<SliType> {
        let mut breached = Vec::new();
        if !self.meets_latency(observed.latency_percentile, observed.latency_ms) {
            breached.push(SliType::Latency);
        }
        if !self.meets_error_rate(observed.error_rate, observed.rate_5xx) {
            breached.push(SliType::ErrorRate);
        }
        if !self.meets_throughput(observed.rps) {
            breached.push(SliType::Throughput);
        }
        if !self.meets_availability(observed.availability) {
            breached.push(SliType::Availability);
        }
        breached
    }
}

const CRITICAL_PATTERNS: [&str; 5] = ["/health", "/auth", "/login", "/payments", "/transactions"];
const NON_CRITICAL_PATTERNS: [&str; 4] = ["/analytics", "/reports", "/export", "/batch"];

/// Endpoint to objective lookup
///
/// # Example
///
/// ```rust
/// use reliability_machines::SloRegistry;
///
/// let registry = SloRegistry::default();
/// assert_eq!(registry.objective_for_endpoint("/auth/login").name(), "critical-endpoints");
/// assert_eq!(registry.objective_for_endpoint("/api/v1/users").name(), "atlas-api");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SloRegistry {
    default: ServiceLevelObjective,
    critical: ServiceLevelObjective,
    non_critical: ServiceLevelObjective,
    critical_patterns: Vec<String>,
    non_critical_patterns: Vec<String>,
}

impl Default for SloRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SloRegistry {
    pub fn builder() -> SloRegistryBuilder {
        SloRegistryBuilder::new()
    }

    /// The built-in objectives and patterns, shared for the process lifetime
    pub fn standard() -> &'static SloRegistry {
        &STANDARD
    }

    /// Case-sensitive substring match; the first matching pattern wins
    pub fn objective_for_endpoint(&self, path: &str) -> &ServiceLevelObjective {
        if self.critical_patterns.iter().any(|p| path.contains(p.as_str())) {
            return &self.critical;
        }
        if self.non_critical_patterns.iter().any(|p| path.contains(p.as_str())) {
            return &self.non_critical;
        }
        &self.default
    }

    pub fn default_objective(&self) -> &ServiceLevelObjective {
        &self.default
    }

    pub fn critical_objective(&self) -> &ServiceLevelObjective {
        &self.critical
    }

    pub fn non_critical_objective(&self) -> &ServiceLevelObjective {
        &self.non_critical
    }
}

/// Builder for registries with custom objectives or patterns
#[derive(Debug, Clone)]
pub struct SloRegistryBuilder {
    registry: SloRegistry,
}

impl SloRegistryBuilder {
    fn new() -> Self {
        Self {
            registry: SloRegistry {
                default: ServiceLevelObjective::api_default(),
                critical: ServiceLevelObjective::critical(),
                non_critical: ServiceLevelObjective::non_critical(),
                critical_patterns: CRITICAL_PATTERNS.iter().map(|p| p.to_string()).collect(),
                non_critical_patterns: NON_CRITICAL_PATTERNS
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
            },
        }
    }

    pub fn default_objective(mut self, objective: ServiceLevelObjective) -> Self {
        self.registry.default = objective;
        self
    }

    pub fn critical_objective(mut self, objective: ServiceLevelObjective) -> Self {
        self.registry.critical = objective;
        self
    }

    pub fn non_critical_objective(mut self, objective: ServiceLevelObjective) -> Self {
        self.registry.non_critical = objective;
        self
    }

    /// Replace the critical pattern list, in match order
    pub fn critical_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.critical_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the non-critical pattern list, in match order
    pub fn non_critical_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.non_critical_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> SloRegistry {
        self.registry
    }
}

static STANDARD: LazyLock<SloRegistry> = LazyLock::new(SloRegistry::default);

/// Look up the objective for a path using the standard registry
pub fn objective_for_endpoint(path: &str) -> &'static ServiceLevelObjective {
    STANDARD.objective_for_endpoint(path)
}

/// Human-readable multi-line summary of an objective
pub fn format_summary(objective: &ServiceLevelObjective) -> String {
    let latency = &objective.latency;
    let errors = &objective.error_rate;
    let throughput = &objective.throughput;

    format!(
        "SLO: {name}
Description: {description}
Evaluation Window: {window} minutes

Latency Targets:
  P50:   {p50:.1}ms
  P95:   {p95:.1}ms
  P99:   {p99:.1}ms
  P999:  {p999:.1}ms

Error Rate Targets:
  Max Error Rate: {error_rate:.2}%
  Max 5xx Rate:   {rate_5xx:.2}%

Throughput Targets:
  Min RPS: {min_rps:.1}
  Max RPS: {max_rps:.1}

Availability Target:
  Min Availability: {availability:.2}%
",
        name = objective.name,
        description = objective.description,
        window = objective.window_minutes,
        p50 = latency.p50_ms,
        p95 = latency.p95_ms,
        p99 = latency.p99_ms,
        p999 = latency.p999_ms,
        error_rate = errors.max_error_rate * 100.0,
        rate_5xx = errors.max_5xx_rate * 100.0,
        min_rps = throughput.min_rps,
        max_rps = throughput.max_rps,
        availability = objective.availability.min_availability * 100.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_sli_valid() {
        let sli = LatencySli::new(50.0, 200.0, 500.0, 1000.0).expect("ascending percentiles");
        assert_eq!(sli.target_ms(Percentile::P95), 200.0);

        assert!(LatencySli::new(100.0, 100.0, 100.0, 100.0).is_ok());
    }

    #[test]
    fn test_latency_sli_invalid_order() {
        assert!(LatencySli::new(500.0, 200.0, 100.0, 50.0).is_err());
        assert!(LatencySli::new(50.0, 200.0, 500.0, 400.0).is_err());
        assert!(LatencySli::new(f64::NAN, 200.0, 500.0, 1000.0).is_err());
    }

    #[test]
    fn test_error_rate_sli_bounds() {
        assert!(ErrorRateSli::new(0.01, 0.001).is_ok());
        assert!(ErrorRateSli::new(1.5, 0.01).is_err());
        assert!(ErrorRateSli::new(0.01, -0.1).is_err());
    }

    #[test]
    fn test_throughput_sli_bounds() {
        assert!(ThroughputSli::new(0.0, 0.0).is_ok());
        assert!(ThroughputSli::new(100.0, 10.0).is_err());
        assert!(ThroughputSli::new(-1.0, 10.0).is_err());
    }

    #[test]
    fn test_availability_sli_bounds() {
        assert!(AvailabilitySli::new(0.999).is_ok());
        assert!(AvailabilitySli::new(1.01).is_err());
    }

    #[test]
    fn test_objective_rejects_empty_window() {
        let result = ServiceLevelObjective::new(
            "custom",
            "custom objective",
            LatencySli::new(1.0, 2.0, 3.0, 4.0).unwrap(),
            ErrorRateSli::new(0.1, 0.01).unwrap(),
            ThroughputSli::new(1.0, 2.0).unwrap(),
            AvailabilitySli::new(0.9).unwrap(),
            0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_standard_objectives_are_valid() {
        for objective in [
            ServiceLevelObjective::api_default(),
            ServiceLevelObjective::critical(),
            ServiceLevelObjective::non_critical(),
        ] {
            let l = objective.latency();
            assert!(LatencySli::new(l.p50_ms, l.p95_ms, l.p99_ms, l.p999_ms).is_ok());
            let e = objective.error_rate();
            assert!(ErrorRateSli::new(e.max_error_rate(), e.max_5xx_rate()).is_ok());
            let t = objective.throughput();
            assert!(ThroughputSli::new(t.min_rps(), t.max_rps()).is_ok());
            assert!(AvailabilitySli::new(objective.availability().min_availability()).is_ok());
        }
    }

    #[test]
    fn test_default_objective_values() {
        let slo = ServiceLevelObjective::api_default();

        assert_eq!(slo.name(), "atlas-api");
        assert_eq!(slo.latency_target(Percentile::P50), 50.0);
        assert_eq!(slo.error_rate().max_error_rate(), 0.01);
        assert_eq!(slo.availability().min_availability(), 0.999);
        assert_eq!(slo.window_minutes(), 5);
    }

    #[test]
    fn test_objective_for_endpoint() {
        let registry = SloRegistry::default();

        assert_eq!(registry.objective_for_endpoint("/auth/login").name(), "critical-endpoints");
        assert_eq!(registry.objective_for_endpoint("/health").name(), "critical-endpoints");
        assert_eq!(
            registry.objective_for_endpoint("/api/v1/payments/42").name(),
            "critical-endpoints"
        );
        assert_eq!(registry.objective_for_endpoint("/api/v1/users").name(), "atlas-api");
        assert_eq!(
            registry.objective_for_endpoint("/reports/export").name(),
            "non-critical-endpoints"
        );
        assert_eq!(registry.objective_for_endpoint("").name(), "atlas-api");
    }

    #[test]
    fn test_critical_patterns_take_precedence() {
        let registry = SloRegistry::default();

        assert_eq!(
            registry.objective_for_endpoint("/batch/payments").name(),
            "critical-endpoints"
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(objective_for_endpoint("/AUTH/login").name(), "atlas-api");
    }

    #[test]
    fn test_custom_registry() {
        let registry = SloRegistry::builder()
            .critical_patterns(["/checkout"])
            .non_critical_patterns(Vec::<String>::new())
            .build();

        assert_eq!(registry.objective_for_endpoint("/checkout/cart").name(), "critical-endpoints");
        assert_eq!(registry.objective_for_endpoint("/auth").name(), "atlas-api");
        assert_eq!(registry.objective_for_endpoint("/reports").name(), "atlas-api");
    }

    #[test]
    fn test_meets_targets() {
        let slo = ServiceLevelObjective::critical();

        assert!(slo.meets_latency(Percentile::P99, 150.0));
        assert!(!slo.meets_latency(Percentile::P50, 25.0));
        assert!(slo.meets_error_rate(0.0005, 0.0));
        assert!(!slo.meets_error_rate(0.0005, 0.001));
        assert!(slo.meets_availability(0.99995));
        assert!(!slo.meets_availability(0.999));
    }

    #[test]
    fn test_format_summary() {
        let summary = format_summary(&ServiceLevelObjective::api_default());

        assert!(summary.contains("SLO: atlas-api"));
        assert!(summary.contains("Evaluation Window: 5 minutes"));
        assert!(summary.contains("P50:   50.0ms"));
        assert!(summary.contains("P999:  1000.0ms"));
        assert!(summary.contains("Max Error Rate: 1.00%"));
        assert!(summary.contains("Max 5xx Rate:   0.10%"));
        assert!(summary.contains("Max RPS: 10000.0"));
        assert!(summary.contains("Min Availability: 99.90%"));
        assert!(summary.lines().count() > 15);
    }

    #[test]
    fn test_free_lookup_uses_shared_registry() {
        let first = objective_for_endpoint("/payments/refund");
        let second = objective_for_endpoint("/login");

        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(first, SloRegistry::standard().critical_objective()));
        assert_eq!(first.name(), "critical-endpoints");
    }

    #[test]
    fn test_breaches_reports_missed_indicators() {
        let slo = ServiceLevelObjective::api_default();
        let healthy = Observation {
            latency_percentile: Percentile::P99,
            latency_ms: 450.0,
            error_rate: 0.005,
            rate_5xx: 0.0005,
            rps: 500.0,
            availability: 0.9995,
        };
        assert!(slo.breaches(&healthy).is_empty());

        let degraded = Observation {
            latency_ms: 900.0,
            rps: 50.0,
            availability: 0.99,
            ..healthy
        };
        assert_eq!(
            slo.breaches(&degraded),
            vec![SliType::Latency, SliType::Throughput, SliType::Availability]
        );

        let failing = Observation {
            rate_5xx: 0.01,
            ..healthy
        };
        assert_eq!(slo.breaches(&failing), vec![SliType::ErrorRate]);
        assert_eq!(SliType::ErrorRate.to_string(), "error_rate");
    }

    #[test]
    fn test_objective_serializes() {
        let rendered = toml::to_string(&ServiceLevelObjective::critical()).expect("serializable");

        assert!(rendered.contains("name = \"critical-endpoints\""));
        assert!(rendered.contains("p99_ms = 200.0"));
    }
}
