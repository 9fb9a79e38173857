//! Crop Diagnosis Server
//!
//! HTTP API in front of the per-crop classifiers. Models are loaded once at
//! startup; requests are dispatched to the classifier registered for the
//! requested crop.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crop_diagnosis::backend::backend_name;
use crop_diagnosis::utils::logging::{init_logging, LogConfig, LogLevel};
use crop_diagnosis::{BurnLoader, DiagnosisService, ServiceConfig, DEFAULT_CONFIG_PATH};

use crate::state::{AppState, ServerConfig};

/// Crop Diagnosis Server
#[derive(Parser, Debug)]
#[command(name = "crop-diagnosis-server")]
#[command(version)]
#[command(about = "HTTP API server for multi-model crop disease diagnosis")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "5000", env = "CROP_DIAGNOSIS_PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Model configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "CROP_DIAGNOSIS_CONFIG")]
    config: PathBuf,

    /// Base directory for relative model paths
    #[arg(long, default_value = ".", env = "CROP_DIAGNOSIS_MODELS_DIR")]
    models_dir: PathBuf,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "CROP_DIAGNOSIS_LOG_LEVEL")]
    log_level: LogLevel,

    /// Enable verbose logging (debug level with targets and thread ids)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::production().with_level(cli.log_level)
    };
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    let config = ServerConfig {
        config_path: cli.config,
        models_dir: cli.models_dir,
    };

    info!("Crop Diagnosis Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Config file: {:?}", config.config_path);
    info!("  Models dir:  {:?}", config.models_dir);
    info!("  Backend:     {}", backend_name());
    info!("  Log level:   {}", log_config.level);

    // Load every model before accepting requests
    let service_config =
        ServiceConfig::load_or_default(&config.config_path)?.resolve_paths(&config.models_dir);
    let service = DiagnosisService::from_config(&service_config, &BurnLoader);

    match service.registry() {
        Some(registry) => info!("Serving crops: {}", registry.crop_keys().join(", ")),
        None => warn!("No model loaded; /diagnose will answer 503"),
    }

    let state = Arc::new(AppState::new(config, service));

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/diagnose", post(routes::diagnose::diagnose))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["crop-diagnosis-server"]).unwrap();
        assert_eq!(cli.port, 5000);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_cli_log_level() {
        let cli =
            Cli::try_parse_from(["crop-diagnosis-server", "--log-level", "warning"]).unwrap();
        assert_eq!(cli.log_level, LogLevel::Warn);

        assert!(Cli::try_parse_from(["crop-diagnosis-server", "--log-level", "loud"]).is_err());
    }
}
