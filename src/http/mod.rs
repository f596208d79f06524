//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → rate_limit middleware (registry routes, when enabled)
//!     → handlers.rs (extract, call RegistryService, encode JSON)
//!     → Send to client
//! ```

pub mod handlers;
pub mod server;

pub use server::{build_router, AppState, RegistryServer};
