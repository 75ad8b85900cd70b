use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

use crate::errors::AppError;

/// Breaker guarding calls to the assistant service.
pub type UpstreamBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for assistant API calls to prevent cascading failures.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// Only errors accepted by [`is_transient`] count as failures, so a burst of
/// expired tokens never opens the circuit for everyone else.
pub fn create_upstream_circuit_breaker() -> UpstreamBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

/// Transport errors and 5xx answers count against the breaker; everything else is the caller's problem.
pub fn is_transient(err: &AppError) -> bool {
    match err.root() {
        AppError::Transport(_) => true,
        AppError::Upstream {
            status: Some(status),
            ..
        } => *status >= 500,
        AppError::Upstream { status: None, .. } => true,
        _ => false,
    }
}
