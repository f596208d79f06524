//! In-memory registry store.
//!
//! # Responsibilities
//! - Hold `app_id -> (instance_id -> ServiceInstance)`
//! - Upsert, refresh, remove and expire instances
//! - Prune application buckets as soon as they become empty
//!
//! # Design Decisions
//! - Sharded map keyed by `app_id`: every bucket mutation happens under the
//!   shard's write lock, so Register/Heartbeat/Deregister/sweep on the same
//!   application are serialized while other applications proceed in parallel
//! - Pruning happens inside the same critical section as the removal
//! - No I/O, no clock: callers pass `now`

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime};

use crate::registry::instance::{InstanceStatus, ServiceInstance};

type Bucket = HashMap<String, ServiceInstance>;

#[derive(Debug, Default)]
pub struct RegistryStore {
    apps: DashMap<String, Bucket>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an instance. Returns true if it replaced an existing entry.
    pub fn upsert(&self, instance: ServiceInstance) -> bool {
        let mut bucket = self.apps.entry(instance.app_id.clone()).or_default();
        bucket
            .insert(instance.instance_id.clone(), instance)
            .is_some()
    }

    /// Refresh the heartbeat of a known instance and mark it UP.
    ///
    /// Unknown instances are left alone; returns whether anything was renewed.
    pub fn touch(&self, app_id: &str, instance_id: &str, now: SystemTime) -> bool {
        let Some(mut bucket) = self.apps.get_mut(app_id) else {
            return false;
        };
        match bucket.get_mut(instance_id) {
            Some(instance) => {
                instance.last_heartbeat = now;
                instance.status = InstanceStatus::Up;
                true
            }
            None => false,
        }
    }

    pub fn set_status(&self, app_id: &str, instance_id: &str, status: InstanceStatus) -> bool {
        let Some(mut bucket) = self.apps.get_mut(app_id) else {
            return false;
        };
        match bucket.get_mut(instance_id) {
            Some(instance) => {
                instance.status = status;
                true
            }
            None => false,
        }
    }

    /// Remove an instance, dropping the application bucket if it becomes empty.
    pub fn remove(&self, app_id: &str, instance_id: &str) -> Option<ServiceInstance> {
        match self.apps.entry(app_id.to_string()) {
            Entry::Occupied(mut bucket) => {
                let removed = bucket.get_mut().remove(instance_id);
                if bucket.get().is_empty() {
                    bucket.remove();
                }
                removed
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Evict every instance whose last heartbeat is older than `ttl` at `now`.
    pub fn evict_expired(&self, now: SystemTime, ttl: Duration) -> Vec<ServiceInstance> {
        let mut evicted = Vec::new();
        self.apps.retain(|_, bucket| {
            bucket.retain(|_, instance| {
                if instance.is_expired(now, ttl) {
                    evicted.push(instance.clone());
                    false
                } else {
                    true
                }
            });
            !bucket.is_empty()
        });
        evicted
    }

    pub fn get(&self, app_id: &str, instance_id: &str) -> Option<ServiceInstance> {
        self.apps
            .get(app_id)
            .and_then(|bucket| bucket.get(instance_id).cloned())
    }

    /// Instances of one application ordered by instance id; `None` if unknown.
    pub fn instances(&self, app_id: &str) -> Option<Vec<ServiceInstance>> {
        let bucket = self.apps.get(app_id)?;
        let mut instances: Vec<_> = bucket.values().cloned().collect();
        drop(bucket);
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Some(instances)
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<ServiceInstance>> {
        let mut all = BTreeMap::new();
        for entry in self.apps.iter() {
            let mut instances: Vec<_> = entry.value().values().cloned().collect();
            instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
            all.insert(entry.key().clone(), instances);
        }
        all
    }

    pub fn app_count(&self) -> usize {
        self.apps.len()
    }

    pub fn instance_count(&self) -> usize {
        self.apps.iter().map(|entry| entry.value().len()).sum()
    }
}
