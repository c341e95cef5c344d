//! Resilience patterns for connector and store operations.
//!
//! Provides retry with backoff, a circuit breaker, and a wrapper that
//! applies both to any [`Connector`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{ConnectorError, ConnectorResult, StoreError};
use crate::filter::FetchQuery;
use crate::record::DataRecord;
use crate::traits::Connector;
use crate::value::FieldMap;

/// Errors that can classify themselves as retryable.
///
/// Both [`ConnectorError`] and [`StoreError`] implement this, so one retry
/// executor serves fetches and store writes alike.
pub trait Transient {
    /// True when the failure may resolve itself and a retry makes sense.
    fn is_transient(&self) -> bool;
}

impl Transient for ConnectorError {
    fn is_transient(&self) -> bool {
        ConnectorError::is_transient(self)
    }
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

/// Backoff shape between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Same delay every attempt.
    Fixed,
    /// Delay grows by `multiplier` per attempt, capped at `max_delay`.
    Exponential {
        multiplier: f64,
        max_delay: Duration,
    },
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// How the delay evolves across attempts.
    pub backoff: BackoffStrategy,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            backoff: BackoffStrategy::Exponential {
                multiplier: 2.0,
                max_delay: Duration::from_secs(10),
            },
            jitter: true,
        }
    }
}

/// Retry executor generic over any [`Transient`] error type.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Create a new retry executor with the default policy.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryPolicy::default())
    }

    /// Calculate delay for a given attempt (0-indexed).
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = match self.policy.backoff {
            BackoffStrategy::Fixed => self.policy.initial_delay.as_millis() as f64,
            BackoffStrategy::Exponential {
                multiplier,
                max_delay,
            } => {
                let raw = self.policy.initial_delay.as_millis() as f64
                    * multiplier.powi(attempt as i32);
                raw.min(max_delay.as_millis() as f64)
            }
        };

        let final_delay = if self.policy.jitter {
            // Up to 25% jitter.
            delay_ms * (1.0 + rand_simple() * 0.25)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Execute an operation, retrying transient failures.
    ///
    /// Permanent failures and the last transient failure after
    /// `max_retries` are returned as-is.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Transient + std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_transient() || attempt >= self.policy.max_retries {
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Execute an operation with retries and circuit breaker protection.
    ///
    /// An open circuit fails fast without consuming retry attempts.
    pub async fn execute_with_circuit_breaker<F, Fut, T>(
        &self,
        circuit_breaker: &CircuitBreaker,
        mut operation: F,
    ) -> ConnectorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ConnectorResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match circuit_breaker.execute(&mut operation).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if matches!(e, ConnectorError::CircuitOpen { .. }) {
                        return Err(e);
                    }

                    if !e.is_transient() || attempt >= self.policy.max_retries {
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Simple pseudo-random number generator for jitter.
/// Not cryptographically secure, but sufficient for jitter.
fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}

/// State of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, operations are processed normally.
    #[default]
    Closed,
    /// Circuit is open, operations are rejected.
    Open,
    /// Circuit is half-open, probe operations are allowed.
    HalfOpen,
}

impl CircuitState {
    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Check if operations should be allowed through.
    #[must_use]
    pub fn allows_operations(&self) -> bool {
        matches!(self, CircuitState::Closed | CircuitState::HalfOpen)
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit.
    pub failure_threshold: u32,
    /// Duration the circuit stays open before transitioning to half-open.
    pub open_duration: Duration,
    /// Number of successful probes required to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Circuit breaker protecting one connector.
///
/// Prevents cascading failures when the remote system is unavailable:
/// after `failure_threshold` consecutive transient failures the circuit
/// opens and calls fail fast until the open window elapses.
#[derive(Debug)]
pub struct CircuitBreaker {
    connector: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    last_failure_time: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(connector: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            connector: connector.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            last_failure_time: AtomicU64::new(0),
        }
    }

    /// Create a new circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults(connector: impl Into<String>) -> Self {
        Self::new(connector, CircuitBreakerConfig::default())
    }

    /// Name of the connector this breaker protects.
    pub fn connector(&self) -> &str {
        &self.connector
    }

    /// Get the current circuit state.
    pub async fn state(&self) -> CircuitState {
        self.maybe_transition_to_half_open().await;
        *self.state.read().await
    }

    /// Check if operations are currently allowed.
    pub async fn is_allowed(&self) -> bool {
        self.state().await.allows_operations()
    }

    /// Record a successful operation.
    pub async fn record_success(&self) {
        let mut state = self.state.write().await;

        match *state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let count = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.success_threshold {
                    debug!(
                        connector = %self.connector,
                        successes = count,
                        "Circuit breaker transitioning to CLOSED"
                    );
                    *state = CircuitState::Closed;
                    self.failure_count.store(0, Ordering::SeqCst);
                    self.success_count.store(0, Ordering::SeqCst);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed operation.
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;

        match *state {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.failure_threshold {
                    warn!(
                        connector = %self.connector,
                        failures = count,
                        "Circuit breaker transitioning to OPEN"
                    );
                    *state = CircuitState::Open;
                    self.stamp_failure_time();
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    connector = %self.connector,
                    "Circuit breaker transitioning back to OPEN after probe failure"
                );
                *state = CircuitState::Open;
                self.success_count.store(0, Ordering::SeqCst);
                self.stamp_failure_time();
            }
            CircuitState::Open => {
                self.stamp_failure_time();
            }
        }
    }

    fn stamp_failure_time(&self) {
        self.last_failure_time.store(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            Ordering::SeqCst,
        );
    }

    /// Check if we should transition from Open to `HalfOpen`.
    async fn maybe_transition_to_half_open(&self) {
        let state = *self.state.read().await;
        if state != CircuitState::Open {
            return;
        }

        let last_failure = self.last_failure_time.load(Ordering::SeqCst);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        if now.saturating_sub(last_failure) >= self.config.open_duration.as_secs() {
            let mut state = self.state.write().await;
            if *state == CircuitState::Open {
                debug!(connector = %self.connector, "Circuit breaker transitioning to HALF_OPEN");
                *state = CircuitState::HalfOpen;
                self.success_count.store(0, Ordering::SeqCst);
            }
        }
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// Only transient failures count toward opening the circuit.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ConnectorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ConnectorResult<T>>,
    {
        if !self.is_allowed().await {
            return Err(ConnectorError::CircuitOpen {
                connector: self.connector.clone(),
            });
        }

        match operation().await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            }
            Err(e) => {
                if e.is_transient() {
                    self.record_failure().await;
                }
                Err(e)
            }
        }
    }

    /// Reset the circuit breaker to closed state.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
    }
}

/// Wraps a connector with retry and circuit breaker protection.
///
/// Implements [`Connector`] itself, so it drops into the engine wherever a
/// bare connector would.
#[derive(Debug)]
pub struct ResilientConnector<C> {
    inner: C,
    circuit_breaker: Arc<CircuitBreaker>,
    retry_executor: RetryExecutor,
}

impl<C: Connector> ResilientConnector<C> {
    /// Wrap a connector with default retry and breaker configuration.
    pub fn new(connector: C) -> Self {
        let breaker = CircuitBreaker::with_defaults(connector.name().to_string());
        Self {
            inner: connector,
            circuit_breaker: Arc::new(breaker),
            retry_executor: RetryExecutor::with_defaults(),
        }
    }

    /// Wrap with custom configuration.
    pub fn with_config(
        connector: C,
        circuit_config: CircuitBreakerConfig,
        retry_policy: RetryPolicy,
    ) -> Self {
        let breaker = CircuitBreaker::new(connector.name().to_string(), circuit_config);
        Self {
            inner: connector,
            circuit_breaker: Arc::new(breaker),
            retry_executor: RetryExecutor::new(retry_policy),
        }
    }

    /// Get a reference to the inner connector.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Get the circuit breaker.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    async fn guarded<F, Fut, T>(&self, operation: F) -> ConnectorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ConnectorResult<T>>,
    {
        self.retry_executor
            .execute_with_circuit_breaker(&self.circuit_breaker, operation)
            .await
    }
}

#[async_trait]
impl<C: Connector> Connector for ResilientConnector<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        self.guarded(|| self.inner.test_connection()).await
    }

    async fn fetch_page(&self, query: &FetchQuery) -> ConnectorResult<Vec<DataRecord>> {
        self.guarded(|| self.inner.fetch_page(query)).await
    }

    async fn create(&self, record: &DataRecord) -> ConnectorResult<DataRecord> {
        self.guarded(|| self.inner.create(record)).await
    }

    async fn update(
        &self,
        data_type: &str,
        external_id: &str,
        changes: &FieldMap,
    ) -> ConnectorResult<DataRecord> {
        self.guarded(|| self.inner.update(data_type, external_id, changes))
            .await
    }

    async fn delete(&self, data_type: &str, external_id: &str) -> ConnectorResult<bool> {
        self.guarded(|| self.inner.delete(data_type, external_id))
            .await
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_circuit_breaker_starts_closed() {
        let cb = CircuitBreaker::with_defaults("crm");
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.is_allowed().await);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            open_duration: Duration::from_secs(1),
            success_threshold: 1,
        };
        let cb = CircuitBreaker::new("crm", config);

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.is_allowed().await);
    }

    #[tokio::test]
    async fn test_circuit_breaker_success_resets_failures() {
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            open_duration: Duration::from_secs(1),
            success_threshold: 1,
        };
        let cb = CircuitBreaker::new("crm", config);

        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_rejects_when_open() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            open_duration: Duration::from_secs(60),
            success_threshold: 1,
        };
        let cb = CircuitBreaker::new("crm", config);

        let _ = cb
            .execute(|| async {
                Err::<(), _>(ConnectorError::unavailable("down"))
            })
            .await;

        let result = cb.execute(|| async { Ok::<_, ConnectorError>(42) }).await;
        assert!(matches!(result, Err(ConnectorError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn test_circuit_breaker_ignores_permanent_errors() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            open_duration: Duration::from_secs(60),
            success_threshold: 1,
        };
        let cb = CircuitBreaker::new("crm", config);

        let _ = cb
            .execute(|| async { Err::<(), _>(ConnectorError::invalid_data("bad payload")) })
            .await;

        // Permanent failures do not trip the breaker.
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_retry_executor_succeeds_first_try() {
        let executor = RetryExecutor::with_defaults();
        let call_count = AtomicUsize::new(0);

        let result = executor
            .execute(|| {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ConnectorError>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_executor_retries_on_transient_error() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            backoff: BackoffStrategy::Exponential {
                multiplier: 2.0,
                max_delay: Duration::from_millis(10),
            },
            jitter: false,
        };
        let executor = RetryExecutor::new(policy);
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let result = executor
            .execute(move || {
                let count = call_count_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(ConnectorError::unavailable("temporarily unavailable"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_executor_fails_on_permanent_error() {
        let executor = RetryExecutor::with_defaults();
        let call_count = AtomicUsize::new(0);

        let result: ConnectorResult<i32> = executor
            .execute(|| {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Err(ConnectorError::invalid_query("permanent error")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_executor_works_for_store_errors() {
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            backoff: BackoffStrategy::Fixed,
            jitter: false,
        };
        let executor = RetryExecutor::new(policy);
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let result = executor
            .execute(move || {
                let count = call_count_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count == 0 {
                        Err(StoreError::unavailable("lock contention"))
                    } else {
                        Ok("written")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "written");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_calculate_delay_exponential_backoff() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            backoff: BackoffStrategy::Exponential {
                multiplier: 2.0,
                max_delay: Duration::from_secs(10),
            },
            jitter: false,
        };
        let executor = RetryExecutor::new(policy);

        assert_eq!(executor.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(executor.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(executor.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(executor.calculate_delay(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_calculate_delay_respects_max() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            backoff: BackoffStrategy::Exponential {
                multiplier: 2.0,
                max_delay: Duration::from_millis(500),
            },
            jitter: false,
        };
        let executor = RetryExecutor::new(policy);

        // 100 * 2^5 = 3200, capped at 500.
        assert_eq!(executor.calculate_delay(5), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_calculate_delay_fixed() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            backoff: BackoffStrategy::Fixed,
            jitter: false,
        };
        let executor = RetryExecutor::new(policy);

        assert_eq!(executor.calculate_delay(0), Duration::from_millis(250));
        assert_eq!(executor.calculate_delay(4), Duration::from_millis(250));
    }
}
