use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::config::AnnotateConfig;

use super::backend::DetectorBackend;
use super::backends::{ReplayBackend, StubBackend};

/// Named detector backends, one of which is the default.
///
/// The pipeline owns its detector for the whole run, so backends are boxed
/// rather than shared.
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn DetectorBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Build the registry for a run: the stub backend plus whichever backend
    /// the configuration selects, which becomes the default.
    ///
    /// Only the selected backend is constructed, so an unused model file is
    /// never loaded.
    pub fn from_config(config: &AnnotateConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(StubBackend::new());

        let settings = &config.detector;
        match settings.backend.as_str() {
            "stub" => {}
            "replay" => {
                let path = settings.detections_path.as_ref().ok_or_else(|| {
                    anyhow!("replay backend requires a detections file (detector.detections_path)")
                })?;
                registry.register(ReplayBackend::from_path(path)?);
            }
            #[cfg(feature = "backend-tract")]
            "tract" => {
                let backend =
                    super::backends::TractBackend::new(&settings.model_path, settings.input_size)?
                        .with_threshold(config.filter.confidence_threshold);
                registry.register(backend);
            }
            #[cfg(not(feature = "backend-tract"))]
            "tract" => {
                return Err(anyhow!(
                    "tract backend requires the backend-tract feature"
                ));
            }
            other => {
                return Err(anyhow!(
                    "unknown detector backend '{}'; expected stub, replay or tract",
                    other
                ))
            }
        }
        registry.set_default(&settings.backend)?;
        Ok(registry)
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn DetectorBackend + 'static)> {
        self.backends.get_mut(name).map(|b| b.as_mut())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    pub fn default_backend_mut(&mut self) -> Result<&mut (dyn DetectorBackend + 'static)> {
        let name = self
            .default_name
            .clone()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        self.get_mut(&name)
            .ok_or_else(|| anyhow!("default backend '{}' missing", name))
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
