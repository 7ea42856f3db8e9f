// src/remote_command_handler/handlers/file_ops.rs
// ============================================
// File operations handlers
// ============================================
// Each handler returns the protocol response. Failures are carried in the
// response's error field, never as Err.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use super::common;
use crate::config::constants::{UPLOAD_DIR_MODE, UPLOAD_FILE_MODE};
use crate::protocol::{AgentMessage, FileInfo};
use crate::utils::unix_seconds;

/// List the entries of a directory
pub async fn handle_list(request_id: &str, path: &Path) -> AgentMessage {
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(request_id, path = %path.display(), "List failed: {}", e);
            return AgentMessage::FileList {
                request_id: request_id.to_string(),
                files: Vec::new(),
                error: Some(e.to_string()),
            };
        }
    };

    let mut files = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                debug!("Skipping unreadable entry in {}: {}", path.display(), e);
                continue;
            }
        };

        // lstat: a symlink is reported as itself
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Skipping {:?}: {}", entry.file_name(), e);
                continue;
            }
        };

        files.push(FileInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            mode: common::format_mode(&metadata),
            mod_time: unix_seconds(metadata.modified()),
            is_dir: metadata.is_dir(),
        });
    }

    debug!(request_id, "Listed {} entries in {}", files.len(), path.display());

    AgentMessage::FileList {
        request_id: request_id.to_string(),
        files,
        error: None,
    }
}

/// Write `data` to `dir/filename`, replacing any existing file
pub async fn handle_upload(request_id: &str, dir: &Path, filename: &str, data: &[u8]) -> AgentMessage {
    if let Err(e) = create_upload_dir(dir).await {
        warn!(request_id, path = %dir.display(), "Upload failed: {}", e);
        return AgentMessage::file_error(request_id, format!("Failed to create directory: {}", e));
    }

    let full_path = dir.join(filename);

    // Replace rather than truncate, so a file owned by another user does
    // not block the write.
    match fs::remove_file(&full_path).await {
        Ok(()) => debug!("Removed existing {}", full_path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove existing {}: {}", full_path.display(), e),
    }

    if let Err(e) = write_upload_file(&full_path, data).await {
        warn!(request_id, path = %full_path.display(), "Upload failed: {}", e);
        return AgentMessage::file_error(request_id, e.to_string());
    }

    info!(request_id, "Uploaded {} bytes to {}", data.len(), full_path.display());
    AgentMessage::file_eof(request_id)
}

/// Read a whole file into a single chunk
pub async fn handle_download(request_id: &str, path: &Path) -> AgentMessage {
    match fs::read(path).await {
        Ok(data) => {
            info!(request_id, "Read {} bytes from {}", data.len(), path.display());
            AgentMessage::FileChunk {
                request_id: request_id.to_string(),
                data,
                eof: true,
                error: None,
            }
        }
        Err(e) => {
            warn!(request_id, path = %path.display(), "Download failed: {}", e);
            AgentMessage::file_error(request_id, e.to_string())
        }
    }
}

/// Remove a file or a whole directory tree. A missing path is not an error.
pub async fn handle_delete(request_id: &str, path: &Path) -> AgentMessage {
    let result = match fs::symlink_metadata(path).await {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!(request_id, "Deleted {}", path.display());
            AgentMessage::file_eof(request_id)
        }
        Err(e) => {
            warn!(request_id, path = %path.display(), "Delete failed: {}", e);
            AgentMessage::file_error(request_id, e.to_string())
        }
    }
}

#[cfg(unix)]
async fn create_upload_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(UPLOAD_DIR_MODE);
    builder.create(dir).await
}

#[cfg(not(unix))]
async fn create_upload_dir(dir: &Path) -> std::io::Result<()> {
    let _ = UPLOAD_DIR_MODE;
    fs::create_dir_all(dir).await
}

#[cfg(unix)]
async fn write_upload_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(UPLOAD_FILE_MODE)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

#[cfg(not(unix))]
async fn write_upload_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let _ = UPLOAD_FILE_MODE;
    fs::write(path, data).await
}
