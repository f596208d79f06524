//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a failure is retryable
//! - Execute retries with exponential backoff + jitter
//! - Bound the number of attempts
//!
//! # Design Decisions
//! - Never retry non-idempotent requests (POST/PATCH) unless the caller marks
//!   them safe, e.g. because they carry an idempotency key
//! - Connection errors always retryable; 5xx retryable for safe requests
//! - An open circuit is not retried by the default predicate: waiting out a
//!   backoff behind an open breaker only delays the fast failure. This is a
//!   property of [`default_predicate`], not of the loop; pass another
//!   predicate to change it
//! - Jittered backoff prevents thundering herd
//! - Backoff sleeps suspend only the calling task

use axum::http::{Method, StatusCode};
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::config::ResilienceConfig;
use crate::observability::metrics;
use crate::resilience::backoff::ExponentialBackoff;
use crate::resilience::error::ResilienceError;
use crate::resilience::timeouts;

/// Downstream errors that know whether trying again could help.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for io::Error {
    fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::TimedOut
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::Interrupted
        )
    }
}

/// Whether a request may be sent twice without changing the outcome.
pub fn is_retry_safe(method: &Method, has_idempotency_key: bool) -> bool {
    method.is_idempotent() || has_idempotency_key
}

/// Retry eligibility of an HTTP failure.
///
/// `status` is `None` for network-level errors (no response received).
pub fn is_retryable(status: Option<StatusCode>, retry_safe: bool) -> bool {
    if !retry_safe {
        return false;
    }
    match status {
        None => true,
        Some(status) => status.is_server_error(),
    }
}

/// Retry transient downstream errors and timeouts; never retry an open
/// circuit, a rate-limit rejection or an already exhausted call.
///
/// Timeouts are treated as retryable, which assumes the operation is safe to
/// repeat. Non-idempotent operations should use [`upstream_only`].
pub fn default_predicate<E: Transient>(err: &ResilienceError<E>) -> bool {
    match err {
        ResilienceError::Upstream(e) => e.is_transient(),
        ResilienceError::Timeout { .. } => true,
        ResilienceError::CircuitOpen { .. }
        | ResilienceError::RateLimited { .. }
        | ResilienceError::RetriesExhausted { .. } => false,
    }
}

/// Retry only downstream errors that classify themselves as transient.
pub fn upstream_only<E: Transient>(err: &ResilienceError<E>) -> bool {
    matches!(err, ResilienceError::Upstream(e) if e.is_transient())
}

/// Per-invocation retry bookkeeping.
#[derive(Debug)]
pub struct RetryContext<E> {
    pub attempt: u32,
    pub max_retries: u32,
    pub last_error: Option<ResilienceError<E>>,
}

impl<E> RetryContext<E> {
    fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
            last_error: None,
        }
    }

    fn can_retry(&self) -> bool {
        self.attempt < self.max_retries
    }

    fn exhausted(self, last: ResilienceError<E>) -> ResilienceError<E> {
        ResilienceError::RetriesExhausted {
            attempts: self.attempt + 1,
            last: Box::new(last),
        }
    }
}

type BackoffFn = dyn Fn(u32) -> Duration + Send + Sync;

/// Bounded retries with a pluggable backoff schedule.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Arc<BackoffFn>,
    attempt_timeout: Option<Duration>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: ExponentialBackoff) -> Self {
        Self::with_backoff_fn(max_retries, move |attempt| backoff.delay(attempt))
    }

    pub fn with_backoff_fn<F>(max_retries: u32, backoff: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            max_retries,
            backoff: Arc::new(backoff),
            attempt_timeout: None,
        }
    }

    /// Retry policy as described by the config, without an attempt timeout.
    ///
    /// The per-attempt timeout is applied by whoever owns the call; see
    /// [`ResilientClient`](crate::resilience::ResilientClient).
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(config.retry_max_attempts, ExponentialBackoff::from_config(config))
    }

    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `op` until it succeeds, the predicate refuses, or retries run out.
    ///
    /// `op` receives the zero-based attempt number. A refused error is
    /// returned as is; running out of retries yields
    /// [`ResilienceError::RetriesExhausted`] carrying the attempt count.
    pub async fn execute<F, Fut, T, E, P>(&self, mut op: F, should_retry: P) -> Result<T, ResilienceError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        P: Fn(&ResilienceError<E>) -> bool,
        E: fmt::Display,
    {
        let mut ctx = RetryContext::new(self.max_retries);
        loop {
            let err = match timeouts::enforce(self.attempt_timeout, op(ctx.attempt)).await {
                Ok(value) => {
                    if ctx.attempt > 0 {
                        tracing::debug!(attempt = ctx.attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !should_retry(&err) {
                tracing::debug!(attempt = ctx.attempt, error = %err, "Failure is not retryable");
                return Err(err);
            }
            if !ctx.can_retry() {
                tracing::warn!(attempts = ctx.attempt + 1, error = %err, "Retries exhausted");
                return Err(ctx.exhausted(err));
            }

            let delay = (self.backoff)(ctx.attempt);
            tracing::info!(
                attempt = ctx.attempt + 1,
                max_retries = ctx.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after failure"
            );
            ctx.last_error = Some(err);
            metrics::record_retry_attempt();
            time::sleep(delay).await;
            ctx.attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}
