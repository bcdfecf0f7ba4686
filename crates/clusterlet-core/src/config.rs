//! Configuration types for clusterlet

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// API server configuration
    pub api: ApiConfig,
    /// Health monitor configuration
    pub monitor: MonitorConfig,
    /// Execution backend configuration
    pub execution: ExecutionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::ClusterletError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.monitor.heartbeat_timeout_delta()?;
        Ok(config)
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind the REST API server
    pub address: String,
    /// Port for the REST API server
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between liveness sweeps in seconds
    pub sweep_interval_secs: u64,
    /// Heartbeat age after which a node is considered unhealthy
    pub heartbeat_timeout_secs: u64,
    /// Upper bound on a single execution backend probe
    pub probe_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 10,
            heartbeat_timeout_secs: 15,
            probe_timeout_secs: 5,
        }
    }
}

impl MonitorConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Heartbeat timeout as a timestamp delta
    pub fn heartbeat_timeout_delta(&self) -> Result<chrono::Duration, crate::ClusterletError> {
        chrono::Duration::from_std(self.heartbeat_timeout()).map_err(|_| {
            crate::ClusterletError::Config(format!(
                "heartbeat_timeout_secs out of range: {}",
                self.heartbeat_timeout_secs
            ))
        })
    }
}

/// Execution backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Which backend runs node resources
    pub backend: ExecutionBackend,
    /// Program launched per node by the process backend
    pub command: PathBuf,
    /// Arguments passed to `command`
    pub args: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            backend: ExecutionBackend::Process,
            command: PathBuf::from("sleep"),
            args: vec!["infinity".to_string()],
        }
    }
}

/// Execution backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionBackend {
    /// One OS process per node
    Process,
    /// In-memory simulation, nothing is launched
    Memory,
}

impl std::str::FromStr for ExecutionBackend {
    type Err = crate::ClusterletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "process" => Ok(ExecutionBackend::Process),
            "memory" => Ok(ExecutionBackend::Memory),
            other => Err(crate::ClusterletError::Config(format!(
                "Unknown execution backend: {}",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (text or compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
