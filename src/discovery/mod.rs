//! Discovery subsystem: the registry as seen by the services using it.
//!
//! # Data Flow
//! ```text
//! Service startup:
//!     → registrar.rs (register, heartbeat loop, deregister on shutdown)
//!         → client.rs (typed HTTP calls through a ResilientClient)
//!
//! Outbound call to a peer:
//!     → client.rs (fetch the peer's instances)
//!     → balancer.rs (rotate over UP instances)
//! ```

pub mod balancer;
pub mod client;
pub mod registrar;

pub use balancer::RoundRobin;
pub use client::{ClientResult, RegistryClient, RegistryClientError};
pub use registrar::Registrar;
