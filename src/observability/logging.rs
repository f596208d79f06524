//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Honour `RUST_LOG` when set, otherwise the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Fields, not interpolated strings, carry ids and counts

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive set for a given level.
pub fn default_directives(level: &str) -> String {
    format!("discovery_mesh={level},tower_http={level}")
}

/// Install the global subscriber.
///
/// Returns an error if a subscriber was already installed.
pub fn init_logging(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives(level).into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
