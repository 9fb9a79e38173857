//! # Crop Diagnosis
//!
//! Multi-model crop disease diagnosis built on the Burn framework.
//!
//! Given a crop identifier and an encoded leaf image, the service picks the
//! classifier trained for that crop, runs inference and returns the diagnosed
//! label together with a recommendation.
//!
//! ## Modules
//!
//! - `model`: reference CNN architecture and per-crop [`ModelSpec`] configuration
//! - `inference`: image preprocessing and the [`Classifier`] adapter
//! - `registry`: startup loading of all configured models, tolerant to partial failure
//! - `dispatch`: the per-request pipeline and label -> recommendation mapping
//! - `utils`: logging and the [`DiagnosisError`] taxonomy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crop_diagnosis::{BurnLoader, DiagnosisService, ServiceConfig};
//!
//! let config = ServiceConfig::load("config/models.toml".as_ref())?;
//! let service = DiagnosisService::from_config(&config, &BurnLoader);
//! let result = service.diagnose("potato", &std::fs::read("leaf.jpg")?)?;
//! println!("{}: {}", result.disease_label, result.recommendation_text);
//! ```

pub mod backend;
pub mod dispatch;
pub mod inference;
pub mod model;
pub mod registry;
pub mod utils;

// Re-export commonly used items for convenience
pub use dispatch::{
    DiagnoseRequest, DiagnoseResponse, DiagnosisResult, DiagnosisService, RecommendationTable,
};
pub use inference::{BurnLoader, Classifier, ClassifierLoader, ImageTensor};
pub use model::{ConstructionMode, ImageSize, ModelSpec, ServiceConfig};
pub use registry::{ModelRegistry, RegistryEntry};
pub use utils::error::{DiagnosisError, Result};

/// Default location of the model configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/models.toml";

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
