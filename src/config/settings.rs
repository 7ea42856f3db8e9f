// src/config/settings.rs
//! Agent configuration settings.
//!
//! This module contains the agent configuration record and the command
//! line arguments, plus loading and validation of the YAML configuration
//! file. The configuration is loaded once at startup and is read-only
//! afterwards.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::defaults;

/// Error type for configuration-related operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the agent
    Run {
        /// Configuration file path
        #[clap(short, long, default_value = defaults::DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Log level (overrides the configuration file)
        #[clap(long)]
        log_level: Option<String>,
    },

    /// Print version information
    Version,
}

/// Command line arguments for the agent
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "srehub-agent",
    about = "SREHub Agent - remote management agent",
    version
)]
pub struct AgentArgs {
    #[clap(subcommand)]
    pub command: Command,
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identifier assigned by the control plane
    pub agent_id: String,

    /// Server network address (host:port)
    pub server_addr: String,

    /// Directory holding ca.pem, cert.pem and key.pem
    pub cert_dir: PathBuf,

    /// Log file; console only when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Name the server certificate must carry
    #[serde(default = "default_tls_server_name")]
    pub tls_server_name: String,

    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_max_concurrent_dispatch")]
    pub max_concurrent_dispatch: usize,

    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_log_level() -> String {
    defaults::DEFAULT_LOG_LEVEL.to_string()
}

fn default_tls_server_name() -> String {
    defaults::DEFAULT_TLS_SERVER_NAME.to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    defaults::DEFAULT_RECONNECT_DELAY_SECS
}

fn default_heartbeat_interval_secs() -> u64 {
    defaults::DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_max_concurrent_dispatch() -> usize {
    defaults::DEFAULT_MAX_CONCURRENT_DISPATCH
}

fn default_shell() -> String {
    defaults::DEFAULT_SHELL.to_string()
}

impl AgentConfig {
    /// Minimal configuration with every optional field at its default.
    pub fn new(
        agent_id: impl Into<String>,
        server_addr: impl Into<String>,
        cert_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            server_addr: server_addr.into(),
            cert_dir: cert_dir.into(),
            log_file: None,
            log_level: default_log_level(),
            tls_server_name: default_tls_server_name(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            max_concurrent_dispatch: default_max_concurrent_dispatch(),
            shell: default_shell(),
        }
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_id.trim().is_empty() {
            return Err(ConfigError::Invalid("agent_id must not be empty".to_string()));
        }

        if self.server_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("server_addr must not be empty".to_string()));
        }

        if self.cert_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("cert_dir must not be empty".to_string()));
        }

        if self.tls_server_name.trim().is_empty() {
            return Err(ConfigError::Invalid("tls_server_name must not be empty".to_string()));
        }

        if self.reconnect_delay_secs == 0 {
            return Err(ConfigError::Invalid("reconnect_delay_secs must be positive".to_string()));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat_interval_secs must be positive".to_string()));
        }

        if self.max_concurrent_dispatch == 0 {
            return Err(ConfigError::Invalid("max_concurrent_dispatch must be positive".to_string()));
        }

        if self.shell.trim().is_empty() {
            return Err(ConfigError::Invalid("shell must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}
