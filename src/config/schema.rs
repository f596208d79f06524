//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the registry
//! server and the resilience toolkit. All types derive Serde traits for
//! deserialization from TOML.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Registry liveness settings.
    pub registry: RegistrySettings,

    /// Timeout configuration for the HTTP surface.
    pub timeouts: TimeoutConfig,

    /// Inbound rate limiting on the registry routes.
    pub rate_limit: RateLimitConfig,

    /// Outbound resilience defaults (breaker, retries, client-side rate limit).
    pub resilience: ResilienceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8761").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8761".to_string(),
        }
    }
}

/// Heartbeat and expiry settings.
///
/// Clients heartbeat every 30 seconds. The TTL is three heartbeat periods so
/// that one or two missed beats (GC pause, scheduling jitter, a slow network
/// hop) never evict a live instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// How often the expiry sweep runs, in seconds.
    pub sweep_interval_secs: u64,

    /// Time without a heartbeat after which an instance is evicted, in seconds.
    pub instance_ttl_secs: u64,

    /// Heartbeat period used by registrars, in seconds.
    pub heartbeat_interval_secs: u64,
}

impl RegistrySettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn instance_ttl(&self) -> Duration {
        Duration::from_secs(self.instance_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            instance_ttl_secs: 90,
            heartbeat_interval_secs: 30,
        }
    }
}

/// Timeout configuration for the HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Inbound rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Length of one fixed window in milliseconds.
    pub window_ms: u64,

    /// Maximum requests per client IP within one window.
    pub max_requests: u32,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: 15 * 60 * 1000,
            max_requests: 100,
        }
    }
}

/// Parameters of a resilient client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Breaker call timeout in milliseconds.
    pub timeout_ms: u64,

    /// Failure percentage (0-100) at which the breaker opens.
    pub error_threshold_percentage: u8,

    /// Time the breaker stays open before letting a probe through, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Calls that must be observed before the failure ratio is trusted.
    pub minimum_samples: u32,

    /// Retries after the initial attempt.
    pub retry_max_attempts: u32,

    /// First backoff delay in milliseconds; doubled per attempt.
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay in milliseconds.
    pub backoff_max_ms: u64,

    /// Per-attempt timeout enforced by the retry loop, in milliseconds. 0 disables it.
    pub attempt_timeout_ms: u64,

    /// Client-side rate limit window in milliseconds.
    pub rate_limit_window_ms: u64,

    /// Calls allowed per window.
    pub rate_limit_max: u32,
}

impl ResilienceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.attempt_timeout_ms > 0).then(|| Duration::from_millis(self.attempt_timeout_ms))
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            error_threshold_percentage: 50,
            reset_timeout_ms: 30_000,
            minimum_samples: 4,
            retry_max_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 2000,
            attempt_timeout_ms: 3000,
            rate_limit_window_ms: 60_000,
            rate_limit_max: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
