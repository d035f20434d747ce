use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};

use crate::config::DetectorSettings;

use super::backend::DetectorBackend;
#[cfg(feature = "backend-tract")]
use super::backends::TractBackend;
use super::backends::StubBackend;

/// Builds a backend from detector settings.
pub type BackendConstructor = fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>>;

/// Registry of named backend constructors.
///
/// Backends are built once per run, in preference order: when the preferred
/// backend cannot be constructed (missing model, missing accelerator) the next
/// one is tried. The pipeline only ever sees the resulting trait object.
pub struct BackendRegistry {
    constructors: HashMap<String, BackendConstructor>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "backend-tract")]
        registry.register("tract", build_tract);
        registry.register("stub", build_stub);
        registry
    }

    /// Register a constructor. Re-registering a name replaces it.
    pub fn register(&mut self, name: &str, constructor: BackendConstructor) {
        self.constructors.insert(name.to_string(), constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the first backend in `preferences` that constructs successfully.
    pub fn create(
        &self,
        preferences: &[String],
        settings: &DetectorSettings,
    ) -> Result<Box<dyn DetectorBackend>> {
        if preferences.is_empty() {
            return Err(anyhow!("no detector backend requested"));
        }

        let mut failures = Vec::new();
        for name in preferences {
            let Some(constructor) = self.constructors.get(name) else {
                log::warn!("detector backend '{}' is not available in this build", name);
                failures.push(format!("{name}: not registered"));
                continue;
            };
            let built = constructor(settings).and_then(|mut backend| {
                backend.warm_up().context("warm-up failed")?;
                Ok(backend)
            });
            match built {
                Ok(backend) => {
                    log::info!("using detector backend '{}'", backend.name());
                    return Ok(backend);
                }
                Err(err) => {
                    log::warn!("detector backend '{}' unavailable: {:#}", name, err);
                    failures.push(format!("{name}: {err:#}"));
                }
            }
        }

        Err(anyhow!(
            "no detector backend could be created ({})",
            failures.join("; ")
        ))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn build_stub(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Ok(Box::new(StubBackend::new(settings.input_spec())))
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend needs a model path"))?;
    Ok(Box::new(TractBackend::new(
        model_path,
        settings.input_spec(),
        settings.batch_size,
    )?))
}
