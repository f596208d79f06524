//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming registry request:
//!     → rate_limit.rs (check per-IP fixed window)
//!     → Pass to handlers
//! ```
//!
//! # Design Decisions
//! - Limiting is opt-in through `[rate_limit] enabled`
//! - Health checks are never limited
//! - Rejections carry standard RateLimit-* headers and Retry-After

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, FixedWindowLimiter, RateDecision};
