// src/protocol/mod.rs
//! Protocol module for the SREHub agent.
//!
//! This module defines the messages exchanged with the control-plane server
//! over the agent stream, and their JSON framing.

pub mod serialization;
pub mod types;

// Re-export commonly used items
pub use serialization::{agent_message_to_ws, ws_message_to_server_message, InboundFrame};
pub use types::{AgentMessage, FileInfo, ServerMessage};
