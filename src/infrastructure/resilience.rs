//! Resilience patterns for forge API calls

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::infrastructure::repository_source::{RepositorySourceError, RepositorySourceResult};
use crate::infrastructure::worker_pool::StopSignal;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// New work may be started
    Closed,
    /// Rate limit threshold reached; no new work for the rest of the run
    Open,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of rate-limited responses within a run before the circuit opens
    pub failure_threshold: u32,
    /// Timeout for individual requests
    pub request_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Rate-limit circuit breaker for one batch run.
///
/// Every `RateLimited` result increments a run-wide counter; successes do not
/// reset it. Once the counter reaches the threshold the circuit opens and stays
/// open, and the worker pool stops dequeuing. Calls already in flight are not
/// interrupted.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<Mutex<CircuitBreakerState>>,
}

#[derive(Debug)]
struct CircuitBreakerState {
    current_state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                ..config
            },
            state: Arc::new(Mutex::new(CircuitBreakerState {
                current_state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            })),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` under the request timeout and record its outcome.
    ///
    /// A timeout becomes a `Network` error. It is not retried and does not
    /// count towards the rate-limit threshold.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> RepositorySourceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = RepositorySourceResult<T>>,
    {
        let result = match tokio::time::timeout(self.config.request_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(RepositorySourceError::Network(format!(
                "request timed out after {}s",
                self.config.request_timeout.as_secs()
            ))),
        };

        if let Err(e) = &result {
            if e.is_rate_limited() {
                self.on_rate_limited().await;
            }
        }
        result
    }

    /// Count one rate-limited response; the increment and the threshold check
    /// happen under a single lock
    async fn on_rate_limited(&self) {
        let mut state = self.state.lock().await;
        state.failure_count += 1;
        debug!(count = state.failure_count, "rate-limited response recorded");

        if state.current_state == CircuitState::Closed
            && state.failure_count >= self.config.failure_threshold
        {
            state.current_state = CircuitState::Open;
            state.opened_at = Some(Instant::now());
            warn!(
                threshold = self.config.failure_threshold,
                "rate limit threshold reached, circuit opened"
            );
        }
    }

    pub async fn is_open(&self) -> bool {
        self.get_state().await == CircuitState::Open
    }

    pub async fn get_state(&self) -> CircuitState {
        self.state.lock().await.current_state
    }

    /// Number of rate-limited responses recorded so far
    pub async fn get_failure_count(&self) -> u32 {
        self.state.lock().await.failure_count
    }

    /// Time since the circuit opened, if it has
    pub async fn open_for(&self) -> Option<Duration> {
        self.state.lock().await.opened_at.map(|t| t.elapsed())
    }
}

#[async_trait]
impl StopSignal for CircuitBreaker {
    async fn should_stop(&self) -> bool {
        self.is_open().await
    }
}
