use crate::core::errors::TrustError;
use failsafe::futures::CircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error, StateMachine};
use std::time::Duration;

/// Circuit breaker guarding calls into an external collaborator
///
/// Policy:
/// - `failure_threshold` consecutive failures trigger OPEN state
/// - `cooldown` before HALF-OPEN (one trial call)
pub type CollaboratorCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Constant>, ()>;

/// Create a circuit breaker with the given policy
pub fn create_circuit_breaker(failure_threshold: u32, cooldown: Duration) -> CollaboratorCircuitBreaker {
    Config::new()
        .failure_policy(failure_policy::consecutive_failures(
            failure_threshold,
            backoff::constant(cooldown),
        ))
        .build()
}

/// Execute a fallible async operation within the circuit breaker protection
///
/// Operation errors are returned unchanged (and counted by the breaker).
/// While the breaker is open the operation is not started and
/// `TrustError::TransientError` is returned instead.
pub async fn execute_with_cb<F, Fut, T>(
    cb: &CollaboratorCircuitBreaker,
    service: &str,
    operation: F,
) -> Result<T, TrustError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, TrustError>>,
{
    match cb.call(operation()).await {
        Ok(val) => Ok(val),
        Err(Error::Inner(e)) => Err(e),
        Err(Error::Rejected) => Err(TrustError::TransientError(format!(
            "Circuit breaker open: {} unavailable",
            service
        ))),
    }
}
