//! Round-robin instance selection.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::registry::ServiceInstance;

/// Round-robin selector.
/// Stores an internal counter to rotate through instances.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next UP instance, skipping DOWN ones. `None` if none is UP.
    pub fn next_instance<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = instances.len();

        (0..len)
            .map(|i| &instances[(start + i) % len])
            .find(|instance| instance.is_up())
    }
}
