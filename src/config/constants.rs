// src/config/constants.rs
//! Application constants and fixed settings.
//!
//! This module contains fixed values that are used throughout the agent,
//! such as file names, buffer sizes, and sentinel exit codes.

use std::time::Duration;

/// Agent version reported at registration
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Certificate material inside the certificate directory
pub const CA_CERT_FILE: &str = "ca.pem";
pub const CLIENT_CERT_FILE: &str = "cert.pem";
pub const CLIENT_KEY_FILE: &str = "key.pem";

/// Path of the agent stream endpoint on the server
pub const AGENT_STREAM_PATH: &str = "/agent/stream";

/// PTY constants
pub const PTY_READ_CHUNK_SIZE: usize = 4096;
pub const PTY_OUTPUT_CHANNEL_SIZE: usize = 256;
pub const TERM_ENV: &str = "xterm-256color";

/// How long Close waits for a killed shell to be reaped
pub const SESSION_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Sentinel exit codes in command results. Real exit codes are 0..=255 and
/// signal deaths are reported as 128 + signal, so negatives never collide.
pub const EXIT_CODE_SPAWN_FAILED: i32 = -1;
pub const EXIT_CODE_TIMED_OUT: i32 = -2;

/// File permissions used by uploads (Unix only)
pub const UPLOAD_DIR_MODE: u32 = 0o755;
pub const UPLOAD_FILE_MODE: u32 = 0o644;
