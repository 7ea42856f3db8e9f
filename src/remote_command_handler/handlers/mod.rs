// src/remote_command_handler/handlers/mod.rs
// ============================================
// Command handlers module
// ============================================

pub mod execute_ops;
pub mod file_ops;

pub(crate) mod common;
