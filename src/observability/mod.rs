//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registry, breaker, retries, limiter produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape), when enabled
//! ```
//!
//! # Design Decisions
//! - Request ID (x-request-id) is set and propagated by the HTTP layer
//! - Recording a metric without an installed recorder is a no-op

pub mod logging;
pub mod metrics;
