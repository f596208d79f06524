//! Registry service: the operations behind the HTTP surface.
//!
//! # Responsibilities
//! - Register, heartbeat, deregister and query instances
//! - Evict instances whose heartbeat is older than the TTL
//! - Run the periodic expiry sweep until shutdown
//!
//! # Design Decisions
//! - Heartbeats for unknown instances succeed silently: a late heartbeat
//!   after eviction must neither resurrect the entry nor fail the caller
//! - Eviction goes through the same store removal as deregistration
//! - One explicitly constructed service per process, shared via Arc

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio::time;
use uuid::Uuid;

use crate::config::RegistrySettings;
use crate::observability::metrics;
use crate::registry::error::RegistryError;
use crate::registry::instance::{InstanceStatus, RegisterRequest, ServiceInstance};
use crate::registry::store::RegistryStore;

#[derive(Debug)]
pub struct RegistryService {
    store: RegistryStore,
    settings: RegistrySettings,
}

impl RegistryService {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            store: RegistryStore::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Upsert an instance under `app_id`, returning its instance id.
    pub fn register(&self, app_id: &str, request: RegisterRequest) -> String {
        let instance_id = request
            .instance_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let instance = ServiceInstance {
            instance_id: instance_id.clone(),
            app_id: app_id.to_string(),
            host_name: request.host_name,
            ip_addr: request.ip_addr,
            port: request.port,
            status: request.status.unwrap_or_default(),
            last_heartbeat: SystemTime::now(),
        };

        let replaced = self.store.upsert(instance);
        tracing::info!(
            app_id = %app_id,
            instance_id = %instance_id,
            replaced,
            "Service registered"
        );
        metrics::record_registration(app_id);
        metrics::record_instance_count(self.store.instance_count());
        instance_id
    }

    /// Refresh an instance's expiry clock. Returns false if it is not registered.
    pub fn heartbeat(&self, app_id: &str, instance_id: &str) -> bool {
        let renewed = self.store.touch(app_id, instance_id, SystemTime::now());
        if renewed {
            tracing::debug!(app_id = %app_id, instance_id = %instance_id, "Heartbeat received");
        } else {
            tracing::debug!(
                app_id = %app_id,
                instance_id = %instance_id,
                "Heartbeat for unknown instance ignored"
            );
        }
        metrics::record_heartbeat(renewed);
        renewed
    }

    pub fn deregister(&self, app_id: &str, instance_id: &str) {
        if self.store.remove(app_id, instance_id).is_some() {
            tracing::info!(app_id = %app_id, instance_id = %instance_id, "Service deregistered");
            metrics::record_deregistration(app_id);
            metrics::record_instance_count(self.store.instance_count());
        }
    }

    pub fn set_status(
        &self,
        app_id: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<(), RegistryError> {
        if self.store.set_status(app_id, instance_id, status) {
            tracing::info!(app_id = %app_id, instance_id = %instance_id, %status, "Status updated");
            Ok(())
        } else {
            Err(RegistryError::InstanceNotFound {
                app_id: app_id.to_string(),
                instance_id: instance_id.to_string(),
            })
        }
    }

    pub fn list_instances(&self, app_id: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        self.store
            .instances(app_id)
            .ok_or_else(|| RegistryError::NotFound {
                app_id: app_id.to_string(),
            })
    }

    pub fn list_all(&self) -> BTreeMap<String, Vec<ServiceInstance>> {
        self.store.snapshot()
    }

    pub fn instance_count(&self) -> usize {
        self.store.instance_count()
    }

    /// Evict instances that have been silent for longer than the TTL.
    pub fn sweep_expired(&self) -> Vec<ServiceInstance> {
        self.sweep_expired_at(SystemTime::now())
    }

    /// Expiry sweep evaluated as of `now`.
    pub fn sweep_expired_at(&self, now: SystemTime) -> Vec<ServiceInstance> {
        let ttl = self.settings.instance_ttl();
        let evicted = self.store.evict_expired(now, ttl);

        for instance in &evicted {
            let silent_secs = now
                .duration_since(instance.last_heartbeat)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            tracing::warn!(
                app_id = %instance.app_id,
                instance_id = %instance.instance_id,
                silent_secs,
                ttl_secs = ttl.as_secs(),
                "Instance expired due to heartbeat timeout, removing from registry"
            );
        }
        if !evicted.is_empty() {
            metrics::record_evictions(evicted.len());
            metrics::record_instance_count(self.store.instance_count());
        }
        evicted
    }

    /// Run the expiry sweep every `sweep_interval` until shutdown fires.
    ///
    /// A zero interval is raised to one millisecond.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let interval = self.settings.sweep_interval().max(Duration::from_millis(1));
        tracing::info!(
            interval_secs = interval.as_secs(),
            ttl_secs = self.settings.instance_ttl_secs,
            "Expiry sweeper starting"
        );

        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Executing instance expiration check");
                    self.sweep_expired();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Expiry sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl Default for RegistryService {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}
