// Export all modules for public use
pub mod config;
pub mod protocol;
pub mod remote_command_handler;
pub mod terminal;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export the most commonly used items for convenience
pub use crate::config::{AgentArgs, AgentConfig, Command};
pub use crate::remote_command_handler::RemoteCommandHandler;
pub use crate::terminal::TerminalSessionManager;
pub use crate::transport::{MessageSender, TransportController};
pub use crate::types::{AgentError, Result};
