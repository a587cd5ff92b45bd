//! Main entry point for the verification server.

use anyhow::Result;
use clap::{Arg, Command};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use verification_server::{config::ServerConfig, http::start_server};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Parse command line arguments
    let matches = Command::new("verification-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Email Verification Server - Issue and check one-time codes sent by email")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file (optional; environment variables also apply)")
                .default_value("verification-config.toml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a default configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("verification-config.toml");

    // Handle config generation
    if matches.get_flag("generate-config") {
        return generate_config(config_path);
    }

    info!("Starting Email Verification Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!("Configuration loaded and validated successfully");
    info!("Server will bind to: {}:{}", config.http.bind_address, config.http.port);
    info!("SMTP server: {}:{}", config.smtp.server, config.smtp.port);
    if !config.smtp.is_configured() {
        warn!("SMTP credentials missing; /api/send-verification will fail until they are set");
    }

    // Start the server
    if let Err(e) = start_server(&config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Load configuration from file (if present) and environment
fn load_config(path: &str) -> Result<ServerConfig> {
    if Path::new(path).exists() {
        info!("Loading configuration from: {}", path);
    } else {
        info!("No configuration file at {}, using defaults and environment", path);
    }

    ServerConfig::load(path).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
}

/// Generate a default configuration file
fn generate_config(path: &str) -> Result<()> {
    let config = ServerConfig::default();

    config.save_to_file(path)?;

    println!("Generated default configuration file: {}", path);
    println!();
    println!("Before sending codes, provide SMTP credentials either in the file");
    println!("(smtp.username / smtp.password) or through the EMAIL_USER and");
    println!("EMAIL_PASS environment variables.");
    println!();
    println!("Example usage after configuration:");
    println!("  cargo run --bin verification-server -- --config {}", path);

    Ok(())
}
