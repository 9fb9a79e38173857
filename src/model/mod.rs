//! Model module: reference architecture and per-crop model configuration
//!
//! - `cnn`: the fixed CNN that weight files are loaded into
//! - `config`: [`ModelSpec`], [`ConstructionMode`] and the TOML service config

pub mod cnn;
pub mod config;

// Re-export main types for convenience
pub use cnn::{ReferenceClassifier, ReferenceClassifierConfig};
pub use config::{ConstructionMode, ImageSize, ModelSpec, ServiceConfig};

/// Number of color channels every classifier consumes
pub const INPUT_CHANNELS: usize = 3;
