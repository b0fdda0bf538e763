use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::{BackendCapability, InferenceBackend};

/// Shared handle to a registered backend.
pub type SharedBackend = Arc<Mutex<dyn InferenceBackend>>;

/// Thread-safe registry of inference backends.
///
/// Backends are wrapped in `Mutex` because `InferenceBackend::infer` takes `&mut self`.
/// Names are caller-chosen keys (e.g. `"outdoor-detect"`, `"depth"`), since the same
/// backend type may be loaded several times with different weights.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend under `name`. The first registered backend becomes the default.
    pub fn register<B: InferenceBackend + 'static>(&mut self, name: &str, backend: B) {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.backends
            .insert(name.to_string(), Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a backend that supports the requested capability.
    ///
    /// Prefers the default backend when it supports the capability, then
    /// falls back to registered backends in name order.
    pub fn backend_for_capability(&self, capability: BackendCapability) -> Result<SharedBackend> {
        if let Some(default_backend) = self.default_backend() {
            if supports(&default_backend, capability)? {
                return Ok(default_backend);
            }
        }

        for name in self.list() {
            if let Some(backend) = self.backends.get(&name) {
                if supports(backend, capability)? {
                    return Ok(backend.clone());
                }
            }
        }

        Err(anyhow!(
            "no registered backend supports capability {:?}",
            capability
        ))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn supports(backend: &SharedBackend, capability: BackendCapability) -> Result<bool> {
    let guard = backend
        .lock()
        .map_err(|_| anyhow!("backend lock poisoned"))?;
    Ok(guard.supports(capability))
}
