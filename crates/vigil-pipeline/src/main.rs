//! vigil - real-time market-quality surveillance pipeline.
//!
//! Ingests order-book and ticker streams from multiple venues, derives
//! microstructure metrics, and raises statistically gated alerts.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use vigil_pipeline::{AppConfig, Application};

/// Market-quality surveillance pipeline
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via VIGIL_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // TLS crypto provider must be installed before the first connection.
    vigil_ws::init_crypto();

    let args = Args::parse();

    if let Err(e) = vigil_telemetry::init_logging() {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::from(1);
    }

    info!("Starting vigil v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("VIGIL_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());
    info!(config_path = %config_path, "Loading configuration");

    let config = match AppConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration invalid");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    let app = match Application::new(config) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    match app.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Pipeline exited with error");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
