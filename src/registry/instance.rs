//! Service instance records and their wire representation.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Liveness status reported for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    #[default]
    Up,
    Down,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One running process of a logical service, identified by `(app_id, instance_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub instance_id: String,
    pub app_id: String,
    pub host_name: String,
    pub ip_addr: String,
    pub port: u16,
    pub status: InstanceStatus,
    /// Last time the instance registered or heartbeated.
    #[serde(with = "epoch_millis")]
    pub last_heartbeat: SystemTime,
}

impl ServiceInstance {
    /// `host:port` address callers should dial, preferring the IP address.
    pub fn authority(&self) -> String {
        let host = if self.ip_addr.is_empty() {
            &self.host_name
        } else {
            &self.ip_addr
        };
        format!("{}:{}", host, self.port)
    }

    pub fn is_up(&self) -> bool {
        self.status == InstanceStatus::Up
    }

    /// True if no heartbeat has been seen for longer than `ttl` as of `now`.
    ///
    /// A heartbeat timestamp in the future (clock step) is never expired.
    pub fn is_expired(&self, now: SystemTime, ttl: std::time::Duration) -> bool {
        match now.duration_since(self.last_heartbeat) {
            Ok(elapsed) => elapsed > ttl,
            Err(_) => false,
        }
    }
}

/// Body of `POST /registry/{appId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub host_name: String,
    pub ip_addr: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,
}

/// Body of `PUT /registry/{appId}/{instanceId}/status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: InstanceStatus,
}

/// Response to a heartbeat. `renewed` is false when the instance is unknown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub renewed: bool,
}

/// All instances registered under one application name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub instances: Vec<ServiceInstance>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Applications {
    pub applications: Vec<Application>,
}

mod epoch_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        serializer.serialize_u64(millis as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}
