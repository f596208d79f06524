//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, percentages <= 100)
//! - Check that the expiry TTL tolerates missed heartbeats
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DiscoveryConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::DiscoveryConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("resilience.error_threshold_percentage must be within 0..=100, got {0}")]
    ThresholdOutOfRange(u8),

    #[error("registry.instance_ttl_secs ({ttl}) must exceed registry.heartbeat_interval_secs ({heartbeat})")]
    TtlTooShort { ttl: u64, heartbeat: u64 },

    #[error("resilience.backoff_max_ms ({max}) is below resilience.backoff_base_ms ({base})")]
    BackoffInverted { base: u64, max: u64 },
}

pub fn validate_config(config: &DiscoveryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let registry = &config.registry;
    let non_zero = [
        ("registry.sweep_interval_secs", registry.sweep_interval_secs),
        ("registry.instance_ttl_secs", registry.instance_ttl_secs),
        ("registry.heartbeat_interval_secs", registry.heartbeat_interval_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("resilience.timeout_ms", config.resilience.timeout_ms),
        ("resilience.rate_limit_window_ms", config.resilience.rate_limit_window_ms),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }
    if config.resilience.minimum_samples == 0 {
        errors.push(ValidationError::Zero { field: "resilience.minimum_samples" });
    }
    if config.rate_limit.enabled && config.rate_limit.window_ms == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.window_ms" });
    }

    if registry.instance_ttl_secs <= registry.heartbeat_interval_secs {
        errors.push(ValidationError::TtlTooShort {
            ttl: registry.instance_ttl_secs,
            heartbeat: registry.heartbeat_interval_secs,
        });
    }

    let resilience = &config.resilience;
    if resilience.error_threshold_percentage > 100 {
        errors.push(ValidationError::ThresholdOutOfRange(resilience.error_threshold_percentage));
    }
    if resilience.backoff_max_ms < resilience.backoff_base_ms {
        errors.push(ValidationError::BackoffInverted {
            base: resilience.backoff_base_ms,
            max: resilience.backoff_max_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&DiscoveryConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = DiscoveryConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.registry.instance_ttl_secs = 30;
        config.resilience.error_threshold_percentage = 150;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::TtlTooShort { ttl: 30, heartbeat: 30 }));
        assert!(errors.contains(&ValidationError::ThresholdOutOfRange(150)));
    }
}
