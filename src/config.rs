//! Configuration module for the teamserver binary.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use teamserver::ServerOption;

/// Command-line arguments for the team server
#[derive(Parser, Debug)]
#[command(name = "teamserver")]
#[command(author = "teamserver authors")]
#[command(version = "0.1.0")]
#[command(about = "A minimal concurrent TCP request router", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Seconds to wait for a request before dropping the connection
    #[arg(long)]
    pub recv_timeout: Option<u64>,

    /// Seconds to wait while sending a response
    #[arg(long)]
    pub send_timeout: Option<u64>,

    /// Seconds in-flight connections get to finish after shutdown
    #[arg(long)]
    pub drain_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration. Timeouts are in seconds; unset or zero
/// means the server default.
#[derive(Debug, Deserialize, Default)]
pub struct ServerConfig {
    /// Address to bind to
    pub listen: Option<String>,
    pub recv_timeout: Option<u64>,
    pub send_timeout: Option<u64>,
    pub drain_timeout: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen: Option<String>,
    pub recv_timeout: Option<u64>,
    pub send_timeout: Option<u64>,
    pub drain_timeout: Option<u64>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            listen: cli.listen.or(toml_config.server.listen),
            recv_timeout: cli.recv_timeout.or(toml_config.server.recv_timeout),
            send_timeout: cli.send_timeout.or(toml_config.server.send_timeout),
            drain_timeout: cli.drain_timeout.or(toml_config.server.drain_timeout),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }

    /// Server settings for every value that was configured
    pub fn server_options(&self) -> Vec<ServerOption> {
        let mut options = Vec::new();
        if let Some(listen) = &self.listen {
            options.push(ServerOption::ListenAddress(listen.clone()));
        }
        if let Some(secs) = self.recv_timeout {
            options.push(ServerOption::RecvTimeout(Duration::from_secs(secs)));
        }
        if let Some(secs) = self.send_timeout {
            options.push(ServerOption::SendTimeout(Duration::from_secs(secs)));
        }
        if let Some(secs) = self.drain_timeout {
            options.push(ServerOption::DrainTimeout(Duration::from_secs(secs)));
        }
        options
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {1}", path = .0.display())]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to parse config file '{path}': {1}", path = .0.display())]
    TomlParse(PathBuf, toml::de::Error),
}
