// src/remote_command_handler.rs
// SREHub Agent - Remote Command Handler
//
// This module handles one-shot requests from the server: shell commands and
// file operations. Both are stateless between calls.

pub mod handlers;

use tracing::{debug, instrument};

use crate::protocol::AgentMessage;
use crate::types::{AgentError, Result};
use handlers::{common, execute_ops, file_ops};

/// File actions understood by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    List,
    Upload,
    Download,
    Delete,
}

impl FileAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "list" => Some(FileAction::List),
            "upload" => Some(FileAction::Upload),
            "download" => Some(FileAction::Download),
            "delete" => Some(FileAction::Delete),
            _ => None,
        }
    }
}

/// Remote command handler
#[derive(Debug, Clone)]
pub struct RemoteCommandHandler {
    shell: String,
}

impl RemoteCommandHandler {
    /// Create a handler that runs commands through `shell -c`
    pub fn new(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }

    /// Execute a shell command. Never fails; errors are in the result.
    #[instrument(skip(self, command))]
    pub async fn execute(&self, request_id: &str, command: &str, timeout_seconds: i32) -> AgentMessage {
        debug!("Executing command: {}", command);
        execute_ops::handle_execute(&self.shell, request_id, command, timeout_seconds).await
    }

    /// Perform one file action.
    ///
    /// Filesystem failures come back inside the response. Only an unknown
    /// action is an `Err`.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn handle_file_request(
        &self,
        request_id: &str,
        action: &str,
        path: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<AgentMessage> {
        let action = FileAction::parse(action).ok_or_else(|| AgentError::UnknownAction(action.to_string()))?;
        let path = common::expand_path(path);

        let response = match action {
            FileAction::List => file_ops::handle_list(request_id, &path).await,
            FileAction::Upload => file_ops::handle_upload(request_id, &path, filename, data).await,
            FileAction::Download => file_ops::handle_download(request_id, &path).await,
            FileAction::Delete => file_ops::handle_delete(request_id, &path).await,
        };

        Ok(response)
    }
}
