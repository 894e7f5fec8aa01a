//! Backend registry keyed by backend identifier.

use std::collections::HashMap;
use std::sync::Arc;

use super::DeviceBackend;
use super::sim::SimBackend;

/// Resolves an instrument's backend identifier to a driver.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn DeviceBackend>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.backends.keys().collect();
        names.sort();
        f.debug_struct("BackendRegistry")
            .field("backends", &names)
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in simulated backend registered as `sim`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SimBackend::new());
        registry
    }

    /// Register a backend under its own name, replacing any previous one.
    pub fn register<B: DeviceBackend>(&mut self, backend: B) -> &mut Self {
        self.register_arc(Arc::new(backend))
    }

    pub fn register_arc(&mut self, backend: Arc<dyn DeviceBackend>) -> &mut Self {
        let name = backend.name().to_string();
        if self.backends.insert(name.clone(), backend).is_some() {
            tracing::warn!(backend = %name, "Replacing previously registered backend");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DeviceBackend>> {
        self.backends.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }
}
