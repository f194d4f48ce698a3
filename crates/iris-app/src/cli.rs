//! CLI argument definitions for the iris binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Iris — text-to-image semantic search over a local image folder.
#[derive(Parser, Debug)]
#[command(name = "iris", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Directory of images to index at startup.
    #[arg(short = 's', long = "source-dir")]
    pub source_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > IRIS_CONFIG env var > ./iris.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("IRIS_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("iris.toml")
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > IRIS_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("IRIS_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Resolve the ingestion source directory.
    ///
    /// Priority: --source-dir flag > config file value.
    pub fn resolve_source_dir(&self, config_dir: &str) -> PathBuf {
        self.source_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(config_dir))
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}
