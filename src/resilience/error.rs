//! Error taxonomy of the resilience layer.
//!
//! Every stage of a resilient call fails with a distinct variant so the
//! calling route can decide between degrading (cached/default response) and
//! surfacing a 429/503/504.

use axum::http::StatusCode;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The caller exceeded its call budget; nothing was attempted.
    RateLimited { key: String },
    /// The breaker rejected the call without invoking the downstream.
    CircuitOpen { name: String },
    /// The operation did not finish within its deadline.
    Timeout { after: Duration },
    /// Every allowed attempt failed; `last` is the final failure.
    RetriesExhausted {
        attempts: u32,
        last: Box<ResilienceError<E>>,
    },
    /// The wrapped operation's own error.
    Upstream(E),
}

impl<E> ResilienceError<E> {
    /// The downstream error at the root of this failure, if any.
    pub fn upstream(&self) -> Option<&E> {
        match self {
            ResilienceError::Upstream(e) => Some(e),
            ResilienceError::RetriesExhausted { last, .. } => last.upstream(),
            _ => None,
        }
    }

    /// Number of attempts that were actually executed.
    pub fn attempts(&self) -> u32 {
        match self {
            ResilienceError::RetriesExhausted { attempts, .. } => *attempts,
            ResilienceError::RateLimited { .. } | ResilienceError::CircuitOpen { .. } => 0,
            _ => 1,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Suggested status for an HTTP caller surfacing this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResilienceError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ResilienceError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ResilienceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ResilienceError::RetriesExhausted { last, .. } => last.status_code(),
            ResilienceError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceError::RateLimited { key } => write!(f, "rate limit exceeded for '{}'", key),
            ResilienceError::CircuitOpen { name } => write!(f, "circuit '{}' is open", name),
            ResilienceError::Timeout { after } => write!(f, "operation timed out after {:?}", after),
            ResilienceError::RetriesExhausted { attempts, last } => {
                write!(f, "retries exhausted after {} attempts: {}", attempts, last)
            }
            ResilienceError::Upstream(e) => write!(f, "{}", e),
        }
    }
}

impl<E> std::error::Error for ResilienceError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResilienceError::Upstream(e) => Some(e),
            ResilienceError::RetriesExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}
