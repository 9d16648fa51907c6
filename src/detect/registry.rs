use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::FaceDetectorBackend;

/// Registry of detector backends.
///
/// Backends are `Send + Sync` and shared by `Arc`, so every camera pipeline
/// holds a reference to the same loaded model.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn FaceDetectorBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: FaceDetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn FaceDetectorBackend>> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<Arc<dyn FaceDetectorBackend>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;

    #[test]
    fn first_registered_backend_is_the_default() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());

        let backend = registry.default_backend().expect("default backend");
        assert_eq!(backend.name(), "stub");
        assert_eq!(registry.list(), vec!["stub".to_string()]);
    }

    #[test]
    fn set_default_rejects_unknown_names() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());

        assert!(registry.set_default("tract").is_err());
        assert!(registry.set_default("stub").is_ok());
    }
}
