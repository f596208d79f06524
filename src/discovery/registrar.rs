//! Self-registration agent.
//!
//! # Responsibilities
//! - Register the local instance at startup
//! - Heartbeat on a fixed interval
//! - Re-register when the registry reports the instance as evicted
//! - Deregister when shutdown is signalled
//!
//! # Design Decisions
//! - The instance id is fixed before the first registration, so every
//!   re-registration is an upsert of the same entry and may be retried
//! - A failed heartbeat is logged and retried on the next tick; only the
//!   registry's own answer (`renewed = false`) triggers re-registration

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::discovery::client::{ClientResult, RegistryClient};
use crate::registry::RegisterRequest;

#[derive(Debug, Clone)]
pub struct Registrar {
    client: RegistryClient,
    app_id: String,
    request: RegisterRequest,
    instance_id: String,
    heartbeat_interval: Duration,
}

impl Registrar {
    /// Build a registrar; a missing instance id is generated here.
    pub fn new(
        client: RegistryClient,
        app_id: impl Into<String>,
        mut request: RegisterRequest,
        heartbeat_interval: Duration,
    ) -> Self {
        let instance_id = request
            .instance_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        request.instance_id = Some(instance_id.clone());
        Self {
            client,
            app_id: app_id.into(),
            request,
            instance_id,
            heartbeat_interval,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub async fn register(&self) -> ClientResult<()> {
        let stored = self.client.register(&self.app_id, &self.request).await?;
        tracing::info!(
            app_id = %self.app_id,
            instance_id = %stored,
            registry = %self.client.base_url(),
            "Registered with registry"
        );
        Ok(())
    }

    pub async fn deregister(&self) -> ClientResult<()> {
        self.client.deregister(&self.app_id, &self.instance_id).await?;
        tracing::info!(app_id = %self.app_id, instance_id = %self.instance_id, "Deregistered from registry");
        Ok(())
    }

    /// Register, heartbeat until `shutdown` fires, then deregister.
    ///
    /// Returns the outcome of the final deregistration.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> ClientResult<()> {
        let mut registered = match self.register().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(app_id = %self.app_id, error = %e, "Initial registration failed");
                false
            }
        };

        let mut ticker = time::interval_at(Instant::now() + self.heartbeat_interval, self.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    registered = self.tick(registered).await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!(app_id = %self.app_id, "Registrar stopping");
                    break;
                }
            }
        }

        if let Err(e) = self.deregister().await {
            tracing::warn!(app_id = %self.app_id, error = %e, "Deregistration failed");
            return Err(e);
        }
        Ok(())
    }

    /// Run on a background task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<ClientResult<()>> {
        tokio::spawn(self.run(shutdown))
    }

    /// One heartbeat period. Returns whether the instance is registered afterwards.
    async fn tick(&self, registered: bool) -> bool {
        if !registered {
            return match self.register().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(app_id = %self.app_id, error = %e, "Registration retry failed");
                    false
                }
            };
        }

        match self.client.heartbeat(&self.app_id, &self.instance_id).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(
                    app_id = %self.app_id,
                    instance_id = %self.instance_id,
                    "Registry dropped this instance, re-registering"
                );
                match self.register().await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(app_id = %self.app_id, error = %e, "Re-registration failed");
                        false
                    }
                }
            }
            Err(e) => {
                tracing::warn!(app_id = %self.app_id, error = %e, "Heartbeat failed");
                true
            }
        }
    }
}
