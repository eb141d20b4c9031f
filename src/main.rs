// src/main.rs

//! The main entry point for the EdgeProxy binary.

use anyhow::Result;
use edgeproxy::config::Config;
use edgeproxy::server;
use std::env;
use tracing::{error, warn};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("EdgeProxy version {VERSION}");
        return Ok(());
    }

    // The configuration path can be provided via a --config flag; otherwise
    // it defaults to "config.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    // A present-but-broken config file is fatal; an absent one just means
    // running on defaults.
    let mut defaulted = false;
    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            if std::path::Path::new(config_path).exists() {
                eprintln!("Failed to load configuration from \"{config_path}\": {e}");
                std::process::exit(1);
            }
            defaulted = true;
            Config::default()
        }
    };

    // Setup logging: RUST_LOG wins over the configured verbosity.
    let log_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_filter().to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter))
        .compact()
        .with_ansi(true)
        .init();

    if defaulted {
        warn!(
            "no configuration file at \"{}\", running with defaults",
            config_path
        );
    }

    if let Err(e) = server::run(config).await {
        error!("EdgeProxy runtime error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
