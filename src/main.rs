//! Crop Diagnosis CLI
//!
//! Diagnose local images against the configured crop models, inspect which
//! models load, and export reference-architecture model files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use crop_diagnosis::backend::{backend_name, default_device, InferenceBackend};
use crop_diagnosis::inference::{save_full_model, save_weights};
use crop_diagnosis::model::ReferenceClassifierConfig;
use crop_diagnosis::utils::format_confidence;
use crop_diagnosis::utils::logging::{init_logging, LogConfig};
use crop_diagnosis::{
    BurnLoader, ConstructionMode, DiagnosisService, ServiceConfig, DEFAULT_CONFIG_PATH,
};

/// Multi-model crop disease diagnosis
#[derive(Parser, Debug)]
#[command(name = "crop_diagnosis")]
#[command(version)]
#[command(about = "Diagnose crop diseases from leaf images with Burn classifiers", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Model configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "CROP_DIAGNOSIS_CONFIG")]
    config: PathBuf,

    /// Base directory for relative model paths
    #[arg(long, default_value = ".", env = "CROP_DIAGNOSIS_MODELS_DIR")]
    models_dir: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Diagnose a single image file
    Diagnose {
        /// Crop key (e.g. potato, mango, wheat)
        #[arg(long)]
        crop: String,

        /// Path to the leaf image
        #[arg(short, long)]
        image: PathBuf,
    },

    /// Show which configured models load
    Models,

    /// Write a freshly initialized reference model for a configured crop
    Export {
        /// Crop key whose labels and input size are used
        #[arg(long)]
        crop: String,

        /// Output file (defaults to the crop's configured source_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let config = ServiceConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    Ok(config.resolve_paths(&cli.models_dir))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    info!("Inference backend: {}", backend_name());

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Diagnose { crop, image } => run_diagnose(&config, crop, image),
        Commands::Models => run_models(&config),
        Commands::Export { crop, output } => run_export(&config, crop, output.as_deref()),
    }
}

fn run_diagnose(config: &ServiceConfig, crop: &str, image: &Path) -> Result<()> {
    let bytes =
        std::fs::read(image).with_context(|| format!("reading image {}", image.display()))?;

    let service = DiagnosisService::from_config(config, &BurnLoader);
    let result = service.diagnose(crop, &bytes)?;

    println!("{}", "Diagnosis".green().bold());
    println!("  Crop:       {}", result.crop_key);
    println!(
        "  Disease:    {} (class {})",
        result.disease_label.bold(),
        result.class_index
    );
    println!("  Confidence: {}", format_confidence(result.confidence));
    println!("  Treatment:  {}", result.recommendation_text);
    Ok(())
}

fn run_models(config: &ServiceConfig) -> Result<()> {
    let service = DiagnosisService::from_config(config, &BurnLoader);

    println!("{}", "Configured models".cyan().bold());
    for spec in &config.models {
        let loaded = service
            .registry()
            .map(|registry| registry.lookup(&spec.crop_key).is_some())
            .unwrap_or(false);
        let status = if loaded {
            "loaded".green()
        } else if spec.source_path.exists() {
            "failed".red()
        } else {
            "missing".yellow()
        };

        println!(
            "  {:<10} {:<8} {:<11} {:>3} classes  {}  {}",
            spec.crop_key,
            status,
            spec.construction_mode.to_string(),
            spec.num_classes(),
            spec.input_size,
            spec.source_path.display()
        );
    }

    if !service.is_available() {
        println!();
        println!("{}", "No model loaded: the service would be unavailable.".red());
    }
    Ok(())
}

fn run_export(config: &ServiceConfig, crop: &str, output: Option<&Path>) -> Result<()> {
    let Some(spec) = config.models.iter().find(|m| m.crop_key == crop) else {
        bail!("crop '{}' is not configured", crop);
    };
    let path = output.unwrap_or(spec.source_path.as_path());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let model_config = ReferenceClassifierConfig::new(
        spec.num_classes(),
        spec.input_size.width as usize,
        spec.input_size.height as usize,
    );
    let device = default_device();
    let model = model_config.init::<InferenceBackend>(&device);

    match spec.construction_mode {
        ConstructionMode::FullModel => save_full_model(model, &model_config, path)?,
        ConstructionMode::ArchitecturePlusWeights => save_weights(model, path)?,
    }

    println!(
        "{} {} model for '{}' written to {}",
        "Exported".green().bold(),
        spec.construction_mode,
        crop,
        path.display()
    );
    Ok(())
}
