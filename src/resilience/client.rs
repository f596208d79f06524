//! Resilient call wrapper.
//!
//! # Data Flow
//! ```text
//! call(caller, op)
//!     → FixedWindowLimiter (over budget → RateLimited, nothing invoked)
//!     → RetryPolicy loop
//!         → CircuitBreaker (open → CircuitOpen, counted as an attempt)
//!             → op() under min(breaker timeout, attempt timeout)
//!         → predicate decides whether to back off and go again
//! ```
//!
//! The rate limit is charged once per logical call. Retries draw on the
//! breaker but not on the caller's budget.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ResilienceConfig;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::resilience::error::ResilienceError;
use crate::resilience::retries::{default_predicate, RetryPolicy, Transient};
use crate::security::rate_limit::FixedWindowLimiter;

/// Limiter key used when calls are not attributed to a caller.
pub const GLOBAL_KEY: &str = "global";

#[derive(Debug, Clone)]
pub struct ResilientClient {
    name: String,
    limiter: Arc<FixedWindowLimiter>,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    attempt_timeout: Option<Duration>,
}

impl ResilientClient {
    pub fn new(
        name: impl Into<String>,
        limiter: Arc<FixedWindowLimiter>,
        retry: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
        attempt_timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            limiter,
            retry,
            breaker,
            attempt_timeout,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        let name = name.into();
        let breaker = CircuitBreaker::new(name.clone(), CircuitBreakerConfig::from(config));
        let limiter = FixedWindowLimiter::new(config.rate_limit_max, config.rate_limit_window());
        Self::new(
            name,
            Arc::new(limiter),
            RetryPolicy::from_config(config),
            Arc::new(breaker),
            config.attempt_timeout(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn limiter(&self) -> &Arc<FixedWindowLimiter> {
        &self.limiter
    }

    /// Run `op` with the default retry predicate.
    pub async fn call<F, Fut, T, E>(&self, caller: &str, op: F) -> Result<T, ResilienceError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + fmt::Display,
    {
        self.call_with(caller, op, default_predicate).await
    }

    /// Run `op` deciding retries with `should_retry`.
    pub async fn call_with<F, Fut, T, E, P>(
        &self,
        caller: &str,
        op: F,
        should_retry: P,
    ) -> Result<T, ResilienceError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&ResilienceError<E>) -> bool,
        E: fmt::Display,
    {
        if !self.limiter.allow(caller) {
            tracing::warn!(client = %self.name, caller = %caller, "Call rejected by rate limiter");
            metrics::record_rate_limited("client");
            return Err(ResilienceError::RateLimited {
                key: caller.to_string(),
            });
        }

        let breaker = self.breaker.as_ref();
        let limit = self.attempt_timeout;
        let op = &op;
        self.retry
            .execute(move |_attempt| breaker.call_within(limit, op), should_retry)
            .await
    }
}
