use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use logpush::alerting::ChannelRegistry;
use logpush::config::Config;
use logpush::monitor::Monitor;

/// Main daemon entry point: tail logs and push notifications until stopped
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("Starting logpush daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        log::info!("Loading configuration from {}", config_path.display());
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file {} not found, using defaults", config_path.display());
        Config::default()
    };

    for warning in config.diagnostics() {
        log::warn!("Config: {}", warning);
    }

    // Setup graceful shutdown signal handling
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        let _ = shutdown_tx.send(true);
    })?;

    let registry = ChannelRegistry::with_defaults();
    let monitor = Monitor::new(Arc::new(config), &registry)?;

    log::info!("Daemon running. Press Ctrl+C to stop.");
    monitor.run(shutdown_rx).await?;

    log::info!("logpush daemon stopped");
    Ok(())
}
