// src/protocol/types.rs
//! Protocol message types.
//!
//! Every message is a JSON object tagged by `type`. Raw byte payloads are
//! base64 strings on the wire.

use serde::{Deserialize, Serialize};

use crate::protocol::serialization::base64_bytes;

/// Messages sent from the agent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// First message on every new stream
    Register {
        agent_id: String,
        hostname: String,
        os: String,
        arch: String,
        version: String,
        ips: Vec<String>,
    },

    Heartbeat {
        agent_id: String,
    },

    /// One chunk of PTY output, in read order
    TermOutput {
        session_id: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    FileList {
        request_id: String,
        #[serde(default)]
        files: Vec<FileInfo>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    FileChunk {
        request_id: String,
        #[serde(default, with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(default)]
        eof: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    CmdResult {
        request_id: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AgentMessage {
    /// File chunk carrying only an error
    pub fn file_error(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        AgentMessage::FileChunk {
            request_id: request_id.into(),
            data: Vec::new(),
            eof: false,
            error: Some(error.into()),
        }
    }

    /// Empty end-of-transfer chunk
    pub fn file_eof(request_id: impl Into<String>) -> Self {
        AgentMessage::FileChunk {
            request_id: request_id.into(),
            data: Vec::new(),
            eof: true,
            error: None,
        }
    }

    /// Wire name of the variant, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            AgentMessage::Register { .. } => "register",
            AgentMessage::Heartbeat { .. } => "heartbeat",
            AgentMessage::TermOutput { .. } => "term_output",
            AgentMessage::FileList { .. } => "file_list",
            AgentMessage::FileChunk { .. } => "file_chunk",
            AgentMessage::CmdResult { .. } => "cmd_result",
        }
    }
}

/// One directory entry in a file listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// `ls -l` style mode string, e.g. `drwxr-xr-x`
    pub mode: String,
    /// Seconds since the Unix epoch
    pub mod_time: i64,
    pub is_dir: bool,
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RegisterAck {
        success: bool,
        #[serde(default)]
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heartbeat_interval_seconds: Option<i64>,
    },

    HeartbeatAck {},

    TermOpen {
        session_id: String,
        cols: u16,
        rows: u16,
    },

    TermInput {
        session_id: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    TermResize {
        session_id: String,
        cols: u16,
        rows: u16,
    },

    TermClose {
        session_id: String,
    },

    FileRequest {
        request_id: String,
        action: String,
        #[serde(default)]
        path: String,
        #[serde(default)]
        filename: String,
        #[serde(default, with = "base64_bytes")]
        data: Vec<u8>,
    },

    CmdRequest {
        request_id: String,
        command: String,
        #[serde(default)]
        timeout_seconds: i32,
    },

    /// Any message type this agent does not know
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Session a terminal message is addressed to
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ServerMessage::TermOpen { session_id, .. }
            | ServerMessage::TermInput { session_id, .. }
            | ServerMessage::TermResize { session_id, .. }
            | ServerMessage::TermClose { session_id } => Some(session_id),
            _ => None,
        }
    }

    /// Whether the message is routed to a terminal session lane
    pub fn is_terminal(&self) -> bool {
        self.session_id().is_some()
    }
}
