//! Model Configuration Module
//!
//! Static per-crop model configuration ([`ModelSpec`]) and the TOML service
//! configuration that lists them.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dispatch::recommendation::RecommendationTable;
use crate::utils::error::{DiagnosisError, Result};

/// Default input size used by the bundled crop models
pub const DEFAULT_INPUT_SIZE: ImageSize = ImageSize {
    width: 224,
    height: 224,
};

/// How a classifier is constructed from its source file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConstructionMode {
    /// The file is a complete archive: architecture hyper-parameters plus weights
    #[serde(rename = "full_model")]
    FullModel,
    /// The file only holds weights for the reference architecture
    #[serde(rename = "weights")]
    ArchitecturePlusWeights,
}

impl fmt::Display for ConstructionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionMode::FullModel => write!(f, "full_model"),
            ConstructionMode::ArchitecturePlusWeights => write!(f, "weights"),
        }
    }
}

/// Image dimensions a model expects, `(width, height)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for ImageSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<ImageSize> for (u32, u32) {
    fn from(size: ImageSize) -> Self {
        (size.width, size.height)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Configuration of one crop's classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSpec {
    /// Unique crop identifier used to select the model
    pub crop_key: String,

    /// Weights file or full model archive
    pub source_path: PathBuf,

    /// How the file is turned into a classifier
    pub construction_mode: ConstructionMode,

    /// Class labels in model output order (must match training order)
    pub class_labels: Vec<String>,

    /// Input size the model expects
    #[serde(default = "default_input_size")]
    pub input_size: ImageSize,
}

fn default_input_size() -> ImageSize {
    DEFAULT_INPUT_SIZE
}

impl ModelSpec {
    /// Create a spec for a weights file with the default input size
    pub fn weights(crop_key: &str, source_path: impl Into<PathBuf>, labels: &[&str]) -> Self {
        Self {
            crop_key: crop_key.to_string(),
            source_path: source_path.into(),
            construction_mode: ConstructionMode::ArchitecturePlusWeights,
            class_labels: labels.iter().map(|l| l.to_string()).collect(),
            input_size: DEFAULT_INPUT_SIZE,
        }
    }

    /// Create a spec for a full model archive with the default input size
    pub fn full_model(crop_key: &str, source_path: impl Into<PathBuf>, labels: &[&str]) -> Self {
        Self {
            construction_mode: ConstructionMode::FullModel,
            ..Self::weights(crop_key, source_path, labels)
        }
    }

    /// Override the input size
    pub fn with_input_size(mut self, input_size: ImageSize) -> Self {
        self.input_size = input_size;
        self
    }

    /// Number of classes the model must output
    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// Reject empty keys, empty label lists and zero input sizes
    pub fn validate(&self) -> Result<()> {
        if self.crop_key.trim().is_empty() {
            return Err(DiagnosisError::Config("crop_key must not be empty".to_string()));
        }
        if self.class_labels.is_empty() {
            return Err(DiagnosisError::Config(format!(
                "crop '{}' has no class labels",
                self.crop_key
            )));
        }
        if self.input_size.width == 0 || self.input_size.height == 0 {
            return Err(DiagnosisError::Config(format!(
                "crop '{}' has an empty input size {}",
                self.crop_key, self.input_size
            )));
        }
        Ok(())
    }
}

/// Top-level service configuration, usually read from `config/models.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Models in registration order
    pub models: Vec<ModelSpec>,

    /// Label to recommendation text mapping
    #[serde(default)]
    pub recommendations: RecommendationTable,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            models: vec![
                ModelSpec::weights(
                    "potato",
                    "models/potato/classifier.mpk",
                    &["Early Blight", "Late Blight", "Healthy"],
                ),
                ModelSpec::weights(
                    "mango",
                    "models/mango/classifier.mpk",
                    &[
                        "Anthracnose",
                        "Bacterial Canker",
                        "Cutting Weevil",
                        "Die Back",
                        "Gall Midge",
                        "Powdery Mildew",
                        "Sooty Mould",
                        "Healthy",
                    ],
                ),
                ModelSpec::weights(
                    "wheat",
                    "models/wheat/classifier.mpk",
                    &["Leaf Rust", "Stem Rust", "Healthy"],
                ),
            ],
            recommendations: RecommendationTable::default(),
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DiagnosisError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` when it exists, otherwise fall back to the built-in table
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(
                "Config file {:?} not found, using built-in model table",
                path
            );
            Ok(Self::default())
        }
    }

    /// Serialize to a TOML document
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DiagnosisError::Config(e.to_string()))
    }

    /// Reject duplicate crop keys and invalid specs
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.models {
            spec.validate()?;
            if !seen.insert(spec.crop_key.as_str()) {
                return Err(DiagnosisError::Config(format!(
                    "duplicate crop_key '{}'",
                    spec.crop_key
                )));
            }
        }
        Ok(())
    }

    /// Resolve relative model paths against `base_dir`
    pub fn resolve_paths(mut self, base_dir: &Path) -> Self {
        for spec in &mut self.models {
            if spec.source_path.is_relative() {
                spec.source_path = base_dir.join(&spec.source_path);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[models]]
crop_key = "potato"
source_path = "models/potato/classifier.mpk"
construction_mode = "weights"
class_labels = ["Early Blight", "Late Blight", "Healthy"]
input_size = [224, 224]

[[models]]
crop_key = "tomato"
source_path = "/srv/models/tomato.mpk"
construction_mode = "full_model"
class_labels = ["Leaf Mold", "Healthy"]
input_size = [256, 192]
"#;

    #[test]
    fn test_parse_sample() {
        let config = ServiceConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.models.len(), 2);

        let tomato = &config.models[1];
        assert_eq!(tomato.construction_mode, ConstructionMode::FullModel);
        assert_eq!(tomato.input_size, ImageSize::new(256, 192));
        assert_eq!(tomato.class_labels, vec!["Leaf Mold", "Healthy"]);

        // No [recommendations] table: defaults apply
        assert_eq!(config.recommendations.healthy_label, "Healthy");
    }

    #[test]
    fn test_shipped_config_matches_builtin_table() {
        let shipped = ServiceConfig::from_toml_str(include_str!("../../config/models.toml")).unwrap();
        let builtin = ServiceConfig::default();
        assert_eq!(shipped.models, builtin.models);
        assert_eq!(shipped.recommendations, builtin.recommendations);
    }

    #[test]
    fn test_default_config_has_three_crops() {
        let config = ServiceConfig::default();
        let keys: Vec<&str> = config.models.iter().map(|m| m.crop_key.as_str()).collect();
        assert_eq!(keys, vec!["potato", "mango", "wheat"]);
        assert_eq!(config.models[1].num_classes(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_crop_key_rejected() {
        let mut config = ServiceConfig::default();
        config.models.push(config.models[0].clone());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate crop_key 'potato'"));
    }

    #[test]
    fn test_empty_labels_rejected() {
        let spec = ModelSpec::weights("corn", "corn.mpk", &[]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let config = ServiceConfig::from_toml_str(SAMPLE)
            .unwrap()
            .resolve_paths(Path::new("/opt/diagnosis"));
        assert_eq!(
            config.models[0].source_path,
            PathBuf::from("/opt/diagnosis/models/potato/classifier.mpk")
        );
        assert_eq!(config.models[1].source_path, PathBuf::from("/srv/models/tomato.mpk"));
    }

    #[test]
    fn test_toml_roundtrip_keeps_label_order() {
        let config = ServiceConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = ServiceConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.models, config.models);
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("models.toml");
        assert_eq!(ServiceConfig::load_or_default(&missing).unwrap().models.len(), 3);

        std::fs::write(&missing, SAMPLE).unwrap();
        let loaded = ServiceConfig::load_or_default(&missing).unwrap();
        assert_eq!(loaded.models[1].crop_key, "tomato");
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServiceConfig::load(Path::new("/nonexistent/models.toml")).unwrap_err();
        assert!(matches!(err, DiagnosisError::Config(_)));
    }
}
