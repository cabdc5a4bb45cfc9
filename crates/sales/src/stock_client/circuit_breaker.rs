use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before letting a probe through.
    pub open_duration: Duration,
    /// Successful probes needed to close the circuit again.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

/// Fails fast while a dependency is down.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Returns false while the circuit is open. Moves an open circuit whose
    /// open duration elapsed to half-open.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.open_duration);
                if elapsed {
                    tracing::info!("Circuit breaker OPEN -> HALF_OPEN");
                    state.state = CircuitState::HalfOpen;
                    state.successes = 0;
                }
                elapsed
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        match state.state {
            CircuitState::HalfOpen => {
                state.successes += 1;
                if state.successes >= self.config.success_threshold {
                    tracing::info!("Circuit breaker HALF_OPEN -> CLOSED");
                    state.state = CircuitState::Closed;
                    state.failures = 0;
                    state.opened_at = None;
                }
            }
            CircuitState::Closed | CircuitState::Open => state.failures = 0,
        }
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        match state.state {
            CircuitState::Closed => {
                state.failures += 1;
                if state.failures >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = state.failures,
                        "Circuit breaker CLOSED -> OPEN"
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("Circuit breaker HALF_OPEN -> OPEN (probe failed)");
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
            CircuitState::Open => state.failures += 1,
        }
    }
}
