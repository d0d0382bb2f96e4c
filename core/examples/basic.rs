//! Basic retry, circuit breaker and SLO usage example

use reliability_machines::{
    CircuitBreaker, Classify, FailureKind, KindSet, RetryOptions, RetryPolicy, format_summary,
    objective_for_endpoint,
};
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
struct PaymentError(u32);

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payment {} failed", self.0)
    }
}

impl Classify for PaymentError {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Unavailable
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    println!("=== Circuit Breaker Basic Example ===\n");

    let circuit = CircuitBreaker::builder("payment_api")
        .failure_threshold(3)
        .recovery_timeout(Duration::from_secs(5))
        .success_threshold(2)
        .on_open(|name| println!("🔴 Circuit '{}' opened!", name))
        .on_close(|name| println!("🟢 Circuit '{}' closed!", name))
        .on_half_open(|name| println!("🟡 Circuit '{}' half-open, testing...", name))
        .build()?;

    println!("Initial state: {}\n", circuit.state_name());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.call(move || Ok::<_, PaymentError>(format!("Payment {}", i))) {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Triggering failures ---");
    for i in 1..=3 {
        match circuit.call(move || Err::<String, _>(PaymentError(i))) {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {} (circuit opened)\n", circuit.state_name());

    println!("--- Attempting call while open ---");
    match circuit.call(|| Ok::<_, PaymentError>("Should be rejected")) {
        Ok(_) => println!("✓ Success"),
        Err(e) => println!("✗ {}", e),
    }
    println!();

    println!("--- Resetting circuit ---");
    circuit.reset();
    println!("State after reset: {}\n", circuit.state_name());

    println!("--- Retrying through the circuit ---");
    let policy = RetryPolicy::new(
        4,
        Duration::from_millis(50),
        Duration::from_millis(500),
        2.0,
        true,
    )?;
    let mut attempts = 0;
    let options = RetryOptions::new("charge")
        .retry_on(KindSet::TRANSIENT)
        .on_retry(|attempt, e| println!("↻ attempt {} failed: {}", attempt, e));
    let result = policy.execute(options, || {
        attempts += 1;
        circuit.call(|| {
            if attempts < 3 {
                Err(PaymentError(attempts))
            } else {
                Ok("Payment successful")
            }
        })
    });
    match result {
        Ok(result) => println!("✓ {} after {} attempts", result, attempts),
        Err(e) => println!("✗ {}", e),
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- SLO for /api/v1/payments ---");
    println!("{}", format_summary(objective_for_endpoint("/api/v1/payments")));

    Ok(())
}
