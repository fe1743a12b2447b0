//! Configuration module for tsadmin.
//!
//! Loads process configuration from environment variables. The HTTP port and
//! the targets file are required; everything else has a default.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_HTTP_PORT: &str = "TSADMIN_HTTP_PORT";
pub const ENV_CONFIG_PATH: &str = "TSADMIN_CONFIG_PATH";
pub const ENV_POLL_INTERVAL: &str = "TSADMIN_POLL_INTERVAL_SECS";
pub const ENV_QUERY_TIMEOUT: &str = "TSADMIN_QUERY_TIMEOUT_SECS";
pub const ENV_PUBLIC_DIR: &str = "TSADMIN_PUBLIC_DIR";

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingEnv(&'static str),
    #[error("{name} has invalid value {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("database name {0:?} is listed more than once")]
    DuplicateTarget(String),
    #[error("database entries must have a non-empty name")]
    EmptyTargetName,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server
    pub http_port: u16,
    /// Path to the JSON file listing the databases to monitor
    pub config_path: PathBuf,
    /// Time between poll cycles (default: 1s)
    pub poll_interval: Duration,
    /// Upper bound on polling a single database (default: 5s)
    pub query_timeout: Duration,
    /// Directory of static dashboard files (default: "public")
    pub public_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            config_path: PathBuf::from("config/config.json"),
            poll_interval: Duration::from_secs(1),
            query_timeout: Duration::from_secs(5),
            public_dir: PathBuf::from("public"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TSADMIN_HTTP_PORT`: HTTP port (required)
    /// - `TSADMIN_CONFIG_PATH`: targets file path (required)
    /// - `TSADMIN_POLL_INTERVAL_SECS`: poll interval in seconds (default: 1)
    /// - `TSADMIN_QUERY_TIMEOUT_SECS`: per-database timeout in seconds (default: 5)
    /// - `TSADMIN_PUBLIC_DIR`: dashboard directory (default: "public")
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut cfg = Self::default();

        let port_str = lookup(ENV_HTTP_PORT).ok_or(ConfigError::MissingEnv(ENV_HTTP_PORT))?;
        cfg.http_port = port_str.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: ENV_HTTP_PORT,
            value: port_str.clone(),
        })?;

        cfg.config_path = lookup(ENV_CONFIG_PATH)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingEnv(ENV_CONFIG_PATH))?;

        if let Some(v) = lookup(ENV_POLL_INTERVAL) {
            cfg.poll_interval = parse_seconds(ENV_POLL_INTERVAL, &v)?;
        }

        if let Some(v) = lookup(ENV_QUERY_TIMEOUT) {
            cfg.query_timeout = parse_seconds(ENV_QUERY_TIMEOUT, &v)?;
        }

        if let Some(dir) = lookup(ENV_PUBLIC_DIR) {
            cfg.public_dir = PathBuf::from(dir);
        }

        Ok(cfg)
    }
}

fn parse_seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(Duration::from_secs_f64(secs)),
        _ => Err(ConfigError::InvalidEnv {
            name,
            value: value.to_string(),
        }),
    }
}
