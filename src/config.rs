//! Configuration for the readyloop endpoints.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over the per-endpoint defaults.

use crate::protocols::sum::parser as sum;
use crate::runtime::RuntimeOptions;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "readyloop")]
#[command(version)]
#[command(about = "Readiness-driven TCP and UDP endpoints", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Per-connection input and output buffer size in bytes
    #[arg(short = 'b', long, global = true)]
    pub buffer_size: Option<usize>,

    /// Maximum number of simultaneous connections
    #[arg(long, global = true)]
    pub max_connections: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

/// Endpoint to run
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reply to every pair of big-endian i32 with their sum
    SumServer {
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1:7777")]
        listen: SocketAddr,
    },
    /// Relay every chat message to all connected clients
    ChatServer {
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1:7778")]
        listen: SocketAddr,
    },
    /// Chat from the console
    ChatClient {
        /// Server address
        server: SocketAddr,
        /// Name shown next to every message sent
        login: String,
    },
    /// Answer each datagram with every byte incremented by one
    UdpEcho {
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1:7779")]
        listen: SocketAddr,
    },
    /// Fetch a page over HTTP/1.1 and print its body
    HttpGet {
        /// Server host name
        host: String,
        /// Request path
        #[arg(default_value = "/")]
        path: String,
        /// Server port
        #[arg(short, long, default_value_t = 80)]
        port: u16,
    },
}

impl Command {
    /// Buffer size used when neither the CLI nor the file sets one.
    pub fn default_buffer_size(&self) -> usize {
        match self {
            Command::ChatServer { .. } | Command::ChatClient { .. } => 10_000,
            Command::HttpGet { .. } => 4096,
            Command::SumServer { .. } | Command::UdpEcho { .. } => 1024,
        }
    }

    /// Smallest buffer that holds one complete request and one reply.
    pub fn min_buffer_size(&self) -> usize {
        match self {
            Command::SumServer { .. } => sum::RECORD_LEN,
            // Two length prefixes with empty login and text
            Command::ChatServer { .. } | Command::ChatClient { .. } => 8,
            Command::UdpEcho { .. } | Command::HttpGet { .. } => 1,
        }
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event loop configuration
#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Per-connection buffer size; the endpoint default applies when unset
    pub buffer_size: Option<usize>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_events_capacity")]
    pub events_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            buffer_size: None,
            max_connections: default_max_connections(),
            events_capacity: default_events_capacity(),
        }
    }
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

fn default_max_connections() -> usize {
    RuntimeOptions::default().max_connections
}

fn default_events_capacity() -> usize {
    RuntimeOptions::default().events_capacity
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub runtime: RuntimeOptions,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve parsed CLI args against the config file they name.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with file values (CLI takes precedence).
    pub fn merge(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let runtime = RuntimeOptions {
            buffer_size: cli
                .buffer_size
                .or(file.runtime.buffer_size)
                .unwrap_or_else(|| cli.command.default_buffer_size()),
            max_connections: cli
                .max_connections
                .unwrap_or(file.runtime.max_connections),
            events_capacity: file.runtime.events_capacity,
        };

        let min = cli.command.min_buffer_size();
        if runtime.buffer_size < min {
            return Err(ConfigError::BufferTooSmall {
                size: runtime.buffer_size,
                min,
            });
        }
        if runtime.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be positive"));
        }
        if runtime.events_capacity == 0 {
            return Err(ConfigError::Invalid("events_capacity must be positive"));
        }

        Ok(Config {
            command: cli.command,
            runtime,
            log_level: cli.log_level.unwrap_or(file.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("buffer_size {size} is below the minimum of {min} bytes for this endpoint")]
    BufferTooSmall { size: usize, min: usize },

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
