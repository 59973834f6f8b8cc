use std::path::{Path, PathBuf};
use std::sync::Arc;
use structopt::StructOpt;

use logpush::alerting::ChannelRegistry;
use logpush::config::{Config, GeoConfig};
use logpush::detection::{EventClassifier, EventGate};
use logpush::geolocation::GeoLocator;
use logpush::models::{LogSource, LogType};

/// logpush command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "logpush", about = "Log monitoring and push notification CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file (.toml or .json)
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Validate a configuration file and build its notifiers
    Check {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Classify the existing lines of a log file and print events as JSON
    Scan {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Path to log file
        #[structopt(short, long)]
        file: PathBuf,
        /// Log format: fail2ban or auth
        #[structopt(short = "t", long = "type", default_value = "fail2ban")]
        log_type: LogType,
        /// Maximum number of events to print
        #[structopt(short = "n", long, default_value = "10")]
        lines: usize,
        /// Skip location lookups
        #[structopt(long)]
        no_geo: bool,
    },
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(Config::from_file(path)?)
    } else {
        eprintln!("Configuration file not found: {:?}, using defaults", path);
        Ok(Config::default())
    }
}

/// Patterns configured for this log type, falling back to the built-in ones
fn scan_source(config: &Config, log_type: LogType, file: &Path) -> LogSource {
    let template = config
        .sources
        .iter()
        .find(|s| s.log_type == log_type)
        .cloned()
        .or_else(|| LogSource::defaults().into_iter().find(|s| s.log_type == log_type));

    match template {
        Some(mut source) => {
            source.path = file.to_path_buf();
            source.enabled = true;
            source
        }
        None => LogSource::new(log_type, file, &[]),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Check { config } => {
            let config = Config::from_file(&config)?;
            let channels = ChannelRegistry::with_defaults().build_enabled(&config)?;
            println!("Configuration loaded successfully");
            println!("  Server: {} ({})", config.server.name, config.server.tag);
            println!("  Enabled notifiers: {}", channels.len());
            println!(
                "  Enabled sources: {}",
                config.sources.iter().filter(|s| s.enabled).count()
            );

            let warnings = config.diagnostics();
            if warnings.is_empty() {
                println!("No problems found");
            } else {
                println!("{} warning(s):", warnings.len());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Cli::Scan {
            config,
            file,
            log_type,
            lines,
            no_geo,
        } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }

            let config = load_config(&config)?;
            let geo_config = GeoConfig {
                enabled: config.geo.enabled && !no_geo,
                ..config.geo.clone()
            };
            let classifier = EventClassifier::new(
                EventGate::from_config(&config),
                Arc::new(GeoLocator::new(&geo_config)?),
            );

            let source = scan_source(&config, log_type, &file);
            let contents = tokio::fs::read(&file).await?;
            let text = String::from_utf8_lossy(&contents);

            let mut shown = 0;
            for line in text.lines() {
                if shown >= lines {
                    break;
                }
                if let Some(event) = classifier.classify(line.trim(), &source).await {
                    println!("{}", serde_json::to_string(&event)?);
                    shown += 1;
                }
            }
            eprintln!("{} event(s) shown", shown);
        }
    }

    Ok(())
}
