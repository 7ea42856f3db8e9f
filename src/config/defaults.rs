// src/config/defaults.rs
//! Default configurations for the SREHub agent.
//!
//! This module provides sensible default values for configuration settings
//! when not explicitly specified in the configuration file.

/// Default configuration file path
pub const DEFAULT_CONFIG_FILE: &str = "agent.yaml";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default name the server certificate is verified against
pub const DEFAULT_TLS_SERVER_NAME: &str = "localhost";

/// Default delay between connect cycles, in seconds
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Default heartbeat period until the server provides one, in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default cap on concurrently executing file and command handlers
pub const DEFAULT_MAX_CONCURRENT_DISPATCH: usize = 64;

/// Default shell for PTY sessions and command execution
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Default command timeout when the request carries none, in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
