//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → client.rs (charge the caller's rate-limit budget)
//!     → retries.rs (loop while the predicate allows, with backoff)
//!         → circuit_breaker.rs (reject while open, count outcomes)
//!             → timeouts.rs (deadline per attempt)
//! ```
//!
//! # Design Decisions
//! - Every stage fails with its own `ResilienceError` variant
//! - The attempt deadline is enforced inside the breaker so timeouts count
//!   as failures instead of looking like cancellations
//! - Retries only for retry-safe operations (idempotent or explicitly keyed)
//! - The breaker and limiter are shared through `Arc`; one client may be
//!   cloned across tasks

pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod retries;
pub mod timeouts;

pub use backoff::ExponentialBackoff;
pub use circuit_breaker::{
    BreakerEvent, BreakerSnapshot, BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use client::{ResilientClient, GLOBAL_KEY};
pub use error::ResilienceError;
pub use retries::{default_predicate, is_retry_safe, is_retryable, upstream_only, RetryPolicy, Transient};
