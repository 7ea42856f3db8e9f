// src/config/mod.rs
//! Configuration module for the SREHub agent.
//!
//! This module manages the agent configuration record, command line
//! arguments, constants, and default values.

pub mod constants;
pub mod defaults;
pub mod settings;

pub use settings::{AgentArgs, AgentConfig, Command, ConfigError};
