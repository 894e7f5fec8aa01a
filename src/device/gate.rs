//! Per-resource exclusion for concurrent task executions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Process-level mutex per device resource.
///
/// Device lock modes are cooperative and device-side; this gate keeps two
/// task executions in this process from interleaving on one resource.
#[derive(Clone, Default)]
pub struct DeviceGate {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl std::fmt::Debug for DeviceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceGate").finish_non_exhaustive()
    }
}

impl DeviceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `resource`. Released when the guard drops.
    pub async fn acquire(&self, resource: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(resource.to_string()).or_default())
        };
        slot.lock_owned().await
    }
}
