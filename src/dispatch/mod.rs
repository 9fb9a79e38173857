//! Dispatch Service
//!
//! Runs one diagnosis request end to end:
//!
//! ```text
//! availability -> input -> model lookup -> preprocess -> infer -> interpret
//! ```
//!
//! The first three checks map to `ServiceUnavailable`, `BadRequest` and
//! `NotFound`. Anything failing after a model was resolved (including a panic
//! inside the inference engine) is reported as `Internal` with the generic
//! error label, so callers always receive a structured result.

pub mod recommendation;

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::inference::classifier::ClassifierLoader;
use crate::inference::preprocess::{decode_base64_image, preprocess};
use crate::model::config::ServiceConfig;
use crate::registry::{ModelRegistry, RegistryEntry};
use crate::utils::error::{DiagnosisError, Result};

pub use recommendation::RecommendationTable;

/// Request body as decoded from JSON by the transport
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnoseRequest {
    /// Base64-encoded image bytes
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub crop_type: Option<String>,
}

/// Successful response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnoseResponse {
    pub disease: String,
    pub treatment: String,
}

/// Outcome of a successful diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub crop_key: String,
    pub class_index: usize,
    pub disease_label: String,
    /// Score of the selected class, in `[0, 1]`
    pub confidence: f32,
    pub recommendation_text: String,
}

impl From<DiagnosisResult> for DiagnoseResponse {
    fn from(result: DiagnosisResult) -> Self {
        Self {
            disease: result.disease_label,
            treatment: result.recommendation_text,
        }
    }
}

/// Index and value of the highest score; ties go to the lowest index
pub fn top_class(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            return None;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best
}

/// Owns the model registry and answers diagnosis requests
///
/// The registry is immutable after construction, so the service can be shared
/// between request threads behind an `Arc` without locking.
#[derive(Debug)]
pub struct DiagnosisService {
    registry: Option<ModelRegistry>,
    recommendations: RecommendationTable,
}

impl DiagnosisService {
    /// Wrap an already built registry; `None` means the service is unavailable
    pub fn new(registry: Option<ModelRegistry>, recommendations: RecommendationTable) -> Self {
        Self {
            registry,
            recommendations,
        }
    }

    /// Build the registry from configuration and wrap it
    pub fn from_config(config: &ServiceConfig, loader: &dyn ClassifierLoader) -> Self {
        let registry = ModelRegistry::build(&config.models, loader);
        Self::new(registry, config.recommendations.clone())
    }

    pub fn is_available(&self) -> bool {
        self.registry.is_some()
    }

    pub fn registry(&self) -> Option<&ModelRegistry> {
        self.registry.as_ref()
    }

    pub fn recommendations(&self) -> &RecommendationTable {
        &self.recommendations
    }

    /// Availability, input and model checks, in that order
    fn resolve(&self, crop_key: &str, has_image: bool) -> Result<&RegistryEntry> {
        let registry = self
            .registry
            .as_ref()
            .ok_or(DiagnosisError::ServiceUnavailable)?;

        if !has_image {
            return Err(DiagnosisError::BadRequest(
                "No image data provided in the request body.".to_string(),
            ));
        }

        registry
            .lookup(crop_key)
            .ok_or_else(|| DiagnosisError::NotFound(crop_key.to_string()))
    }

    /// Preprocess, infer and interpret against a resolved entry
    fn interpret(
        &self,
        crop_key: &str,
        entry: &RegistryEntry,
        encoded_image: &[u8],
    ) -> Result<DiagnosisResult> {
        let start = Instant::now();

        let input = preprocess(encoded_image, entry.input_size())?;
        let scores = entry.classifier().predict(&input)?;

        let labels = entry.class_labels();
        if scores.len() != labels.len() {
            return Err(DiagnosisError::Inference(format!(
                "model returned {} scores for {} class labels",
                scores.len(),
                labels.len()
            )));
        }

        let (class_index, confidence) = top_class(&scores).ok_or_else(|| {
            DiagnosisError::Inference("model returned no usable scores".to_string())
        })?;
        let disease_label = labels[class_index].clone();

        debug!(
            "Diagnosed '{}' as {} ({:.2}%) in {:.1} ms",
            crop_key,
            disease_label,
            confidence * 100.0,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(DiagnosisResult {
            crop_key: crop_key.to_string(),
            class_index,
            recommendation_text: self.recommendations.recommend(&disease_label),
            disease_label,
            confidence,
        })
    }

    /// Run `stage` and turn any failure or panic into an `Internal` error
    fn guarded<F>(&self, crop_key: &str, stage: F) -> Result<DiagnosisResult>
    where
        F: FnOnce() -> Result<DiagnosisResult>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(stage)).unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "inference panicked".to_string());
            Err(DiagnosisError::Inference(message))
        });

        outcome.map_err(|e| {
            warn!("Prediction failed for {}: {}", crop_key, e);
            DiagnosisError::internal(e)
        })
    }

    /// Diagnose raw encoded image bytes for a crop
    pub fn diagnose(&self, crop_key: &str, encoded_image: &[u8]) -> Result<DiagnosisResult> {
        let entry = self.resolve(crop_key, !encoded_image.is_empty())?;
        self.guarded(crop_key, || self.interpret(crop_key, entry, encoded_image))
    }

    /// Diagnose a JSON request whose image is base64 text
    pub fn diagnose_request(&self, request: &DiagnoseRequest) -> Result<DiagnosisResult> {
        let image = request.image.as_deref().unwrap_or_default();
        let crop_key = request.crop_type.as_deref().unwrap_or_default();

        let entry = self.resolve(crop_key, !image.trim().is_empty())?;
        self.guarded(crop_key, || {
            let bytes = decode_base64_image(image)?;
            self.interpret(crop_key, entry, &bytes)
        })
    }
}
