//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! POST/PUT/DELETE /registry/...
//!     → service.rs (register / heartbeat / deregister / status)
//!     → store.rs (sharded app_id → instance_id → ServiceInstance)
//!
//! Periodic timer
//!     → service.rs sweep (evict instances silent for longer than the TTL)
//!     → store.rs (remove + prune empty application buckets)
//! ```
//!
//! # Design Decisions
//! - State lives in memory only; a restart starts empty and clients re-register
//! - Liveness is heartbeat-driven; the registry never probes instances

pub mod error;
pub mod instance;
pub mod service;
pub mod store;

pub use error::RegistryError;
pub use instance::{
    Application, Applications, HeartbeatAck, InstanceStatus, RegisterRequest, ServiceInstance,
    StatusUpdate,
};
pub use service::RegistryService;
pub use store::RegistryStore;
