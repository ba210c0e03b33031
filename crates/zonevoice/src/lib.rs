//! # zonevoice - Main Entry Point
//!
//! Routes players between voice channels as they walk between zones of a
//! game world. This entry point handles CLI parsing, configuration loading,
//! and application lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! zonevoice
//!
//! # Specify custom configuration
//! zonevoice --config production.toml
//!
//! # Route on virtual server 2 of a remote bridge
//! zonevoice --backend-url ws://voice.internal:6502 --server-id 2
//!
//! # Try the ingress without a voice server
//! zonevoice --dry-run --log-level debug
//! ```
//!
//! ## Configuration
//!
//! The router loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! - SIGINT (Ctrl+C) / SIGTERM: graceful shutdown; a second signal exits at once
//! - SIGHUP (Unix): re-read the zone table from the configuration file

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::{apply_cli_overrides, Application};
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for zonevoice.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime, including an
///   unreachable or unhealthy voice backend
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    apply_cli_overrides(&mut config, &args);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{
    BackendSettings, LoggingSettings, RoutingSettings, SecuritySettings, ServerSettings,
};
