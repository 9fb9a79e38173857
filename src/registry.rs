//! Model Registry
//!
//! Built once at startup from the configured [`ModelSpec`]s. Each model is
//! loaded independently: a missing or broken file only removes that crop.
//! When nothing loads, [`ModelRegistry::build`] returns `None` and the service
//! stays unavailable until restart.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::{error, info, warn};

use crate::inference::classifier::{Classifier, ClassifierLoader};
use crate::model::config::{ImageSize, ModelSpec};
use crate::utils::error::{DiagnosisError, Result};

/// One loaded crop model with the metadata needed to use it
pub struct RegistryEntry {
    classifier: Box<dyn Classifier>,
    class_labels: Vec<String>,
    input_size: ImageSize,
}

impl RegistryEntry {
    pub fn new(classifier: Box<dyn Classifier>, spec: &ModelSpec) -> Self {
        Self {
            classifier,
            class_labels: spec.class_labels.clone(),
            input_size: spec.input_size,
        }
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    pub fn input_size(&self) -> ImageSize {
        self.input_size
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("class_labels", &self.class_labels)
            .field("input_size", &self.input_size)
            .finish()
    }
}

/// Immutable crop key -> model mapping, shared read-only after startup
#[derive(Debug)]
pub struct ModelRegistry {
    entries: HashMap<String, RegistryEntry>,
}

/// Load one spec, reporting why it could not be registered
fn load_entry(spec: &ModelSpec, loader: &dyn ClassifierLoader) -> Result<RegistryEntry> {
    spec.validate()?;
    if !spec.source_path.exists() {
        return Err(DiagnosisError::ConfigMissing(spec.source_path.clone()));
    }

    // A backend panic on a malformed record only takes out this crop
    let classifier = panic::catch_unwind(AssertUnwindSafe(|| loader.load(spec))).unwrap_or_else(
        |_| {
            Err(DiagnosisError::Load {
                path: spec.source_path.clone(),
                reason: "model construction panicked".to_string(),
            })
        },
    )?;

    if let Some(outputs) = classifier.num_classes() {
        if outputs != spec.num_classes() {
            return Err(DiagnosisError::Load {
                path: spec.source_path.clone(),
                reason: format!(
                    "model outputs {} classes but {} labels are configured",
                    outputs,
                    spec.num_classes()
                ),
            });
        }
    }

    Ok(RegistryEntry::new(classifier, spec))
}

impl ModelRegistry {
    /// Load every spec in order; `None` when not a single model could be loaded
    pub fn build(specs: &[ModelSpec], loader: &dyn ClassifierLoader) -> Option<Self> {
        let mut entries = HashMap::with_capacity(specs.len());

        for spec in specs {
            if entries.contains_key(&spec.crop_key) {
                warn!(
                    "Skipping duplicate model configuration for crop '{}'",
                    spec.crop_key
                );
                continue;
            }

            match load_entry(spec, loader) {
                Ok(entry) => {
                    info!(
                        "Loaded {} model for '{}' from {:?} ({} classes, input {})",
                        spec.construction_mode,
                        spec.crop_key,
                        spec.source_path,
                        spec.num_classes(),
                        spec.input_size
                    );
                    entries.insert(spec.crop_key.clone(), entry);
                }
                Err(DiagnosisError::ConfigMissing(path)) => {
                    warn!(
                        "Model file not found for '{}' at path: {:?}",
                        spec.crop_key, path
                    );
                }
                Err(e) => {
                    error!("Failed to load model for '{}': {}", spec.crop_key, e);
                }
            }
        }

        if entries.is_empty() {
            error!(
                "No ML models were loaded ({} configured). Service is unavailable.",
                specs.len()
            );
            return None;
        }

        info!(
            "Model registry ready: {}/{} models loaded",
            entries.len(),
            specs.len()
        );
        Some(Self { entries })
    }

    /// Look up the entry for a crop
    pub fn lookup(&self, crop_key: &str) -> Option<&RegistryEntry> {
        self.entries.get(crop_key)
    }

    /// Registered crop keys, sorted
    pub fn crop_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
