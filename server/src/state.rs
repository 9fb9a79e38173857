//! Application state for the diagnosis server
//!
//! The model registry is built before the listener binds and never changes
//! afterwards, so request handlers share it without locking.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crop_diagnosis::DiagnosisService;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Model configuration file
    pub config_path: PathBuf,
    /// Base directory for relative model paths
    pub models_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(crop_diagnosis::DEFAULT_CONFIG_PATH),
            models_dir: PathBuf::from("."),
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Registry and dispatch pipeline
    pub service: DiagnosisService,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, service: DiagnosisService) -> Self {
        Self {
            config,
            service,
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
