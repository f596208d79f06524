//! Service discovery registry and client-side resilience toolkit.

pub mod config;
pub mod discovery;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod security;

pub use config::schema::DiscoveryConfig;
pub use http::RegistryServer;
pub use lifecycle::Shutdown;
