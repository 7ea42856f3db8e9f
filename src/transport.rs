// src/transport.rs
// ============================================
// SREHub Agent - Transport Controller
// ============================================
// Main Functionality:
// - Owns the single duplex stream to the server (mutual TLS + WebSocket)
// - Sends Register as the first message of every connection
// - Runs the heartbeat while connected
// - Receives server messages and routes them to the session manager,
//   the command executor and the file handler
// - Reconnects after a fixed delay whenever the stream fails, until the
//   root cancellation token fires
//
// Main Logical Flow:
// 1. Load TLS material and open the stream (connection.rs, tls.rs)
// 2. Send Register, then install the write half behind the writer lock
// 3. Start the heartbeat task (heartbeat.rs) and the dispatcher (handlers.rs)
// 4. Receive until the stream ends or errors; tear down per-connection tasks
// 5. Sleep for the reconnect delay and go back to 1
// ============================================

pub mod connection;
mod handlers;
pub mod heartbeat;
pub mod tls;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::constants::AGENT_VERSION;
use crate::config::AgentConfig;
use crate::protocol::{agent_message_to_ws, ws_message_to_server_message, AgentMessage, InboundFrame};
use crate::remote_command_handler::RemoteCommandHandler;
use crate::terminal::TerminalSessionManager;
use crate::types::{AgentError, Result};
use crate::utils::system;

pub use connection::StreamWriter;
use handlers::Dispatcher;
use heartbeat::HeartbeatInterval;

/// Outbound path to the server.
///
/// Implementations serialize concurrent callers so frames never interleave.
/// Sending while disconnected fails with [`AgentError::NotConnected`].
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: AgentMessage) -> Result<()>;
}

/// Transport controller
pub struct TransportController {
    config: Arc<AgentConfig>,
    writer: Arc<StreamWriter>,
    terminals: Arc<TerminalSessionManager>,
    commands: Arc<RemoteCommandHandler>,
    heartbeat: Arc<HeartbeatInterval>,
    dispatch_limit: Arc<Semaphore>,
    attempts: AtomicU64,
}

impl TransportController {
    /// Create a controller and the request handlers it dispatches to
    pub fn new(config: AgentConfig) -> Self {
        let writer = Arc::new(StreamWriter::new());
        let terminals = Arc::new(TerminalSessionManager::new(writer.clone(), config.shell.clone()));
        let commands = Arc::new(RemoteCommandHandler::new(config.shell.clone()));
        let heartbeat = Arc::new(HeartbeatInterval::new(config.heartbeat_interval_secs));
        let dispatch_limit = Arc::new(Semaphore::new(config.max_concurrent_dispatch));

        Self {
            config: Arc::new(config),
            writer,
            terminals,
            commands,
            heartbeat,
            dispatch_limit,
            attempts: AtomicU64::new(0),
        }
    }

    /// Terminal sessions owned by this agent
    pub fn terminals(&self) -> Arc<TerminalSessionManager> {
        self.terminals.clone()
    }

    /// Current heartbeat period
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat.get()
    }

    /// Number of connect attempts made so far
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Whether a stream is currently installed
    pub async fn is_connected(&self) -> bool {
        self.writer.is_connected().await
    }

    /// Connect-serve-reconnect loop.
    ///
    /// Only returns once `token` is cancelled, with [`AgentError::Cancelled`].
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let delay = self.config.reconnect_delay();

        loop {
            if token.is_cancelled() {
                break;
            }

            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            info!("Connecting to {} (attempt {})", self.config.server_addr, attempt);

            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.connect_and_serve(&token) => result,
            };

            match result {
                Ok(()) => info!("Stream closed"),
                Err(AgentError::Cancelled) => break,
                Err(e) if e.is_connection_level() => warn!("Connection lost: {}", e),
                Err(e) => error!("Connection failed: {}", e),
            }

            warn!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.writer.clear().await;
        info!("Transport stopped");
        Err(AgentError::Cancelled)
    }

    /// One connect cycle: TLS, stream, then serve until the stream ends
    pub async fn connect_and_serve(&self, token: &CancellationToken) -> Result<()> {
        let tls_config = tls::load_client_config(&self.config.cert_dir)?;
        let stream = connection::open_stream(&self.config, tls_config).await?;
        self.serve_stream(stream, token).await
    }

    /// Serve an established stream.
    ///
    /// Returns when the stream closes or fails, or when `token` is cancelled.
    /// Any end of the stream is reported as an error so the caller reconnects.
    pub async fn serve_stream<S>(&self, stream: WebSocketStream<S>, token: &CancellationToken) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut read) = stream.split();

        // Register goes out before anything else can reach the writer.
        let register = self.register_message();
        sink.send(agent_message_to_ws(&register)?).await?;
        info!("Registered as {}", self.config.agent_id);

        self.writer.install(Box::pin(sink)).await;

        let connection_token = token.child_token();
        let _stop_tasks = connection_token.clone().drop_guard();

        let sender: Arc<dyn MessageSender> = self.writer.clone();
        let heartbeat_task = heartbeat::spawn_heartbeat(
            sender.clone(),
            self.config.agent_id.clone(),
            self.heartbeat.clone(),
            connection_token.clone(),
        );

        let (dispatcher, terminal_router) = Dispatcher::start(
            self.terminals.clone(),
            self.commands.clone(),
            sender,
            self.heartbeat.clone(),
            self.dispatch_limit.clone(),
        );

        let result = loop {
            let frame = tokio::select! {
                _ = connection_token.cancelled() => {
                    if token.is_cancelled() {
                        break Err(AgentError::Cancelled);
                    }
                    break Err(AgentError::Connection("stream write failed".to_string()));
                }
                frame = read.next() => frame,
            };

            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => break Err(AgentError::WebSocket(e)),
                None => break Err(AgentError::Connection("stream ended".to_string())),
            };

            match ws_message_to_server_message(frame) {
                Ok(InboundFrame::Message(message)) => dispatcher.dispatch(message),
                Ok(InboundFrame::Ping(data)) => {
                    if let Err(e) = self.writer.send_frame(Message::Pong(data)).await {
                        warn!("Failed to answer ping: {}", e);
                    }
                }
                Ok(InboundFrame::Ignored) => {}
                Ok(InboundFrame::Close(reason)) => {
                    break Err(AgentError::Connection(format!(
                        "server closed the stream: {}",
                        reason.unwrap_or_default()
                    )));
                }
                Err(e) => warn!("Skipping malformed message: {}", e),
            }
        };

        connection_token.cancel();
        self.writer.clear().await;

        // Pending terminal requests still drain through their lanes.
        drop(dispatcher);
        if let Err(e) = heartbeat_task.await {
            debug!("Heartbeat task ended abnormally: {}", e);
        }
        if let Err(e) = terminal_router.await {
            debug!("Terminal router ended abnormally: {}", e);
        }

        result
    }

    fn register_message(&self) -> AgentMessage {
        AgentMessage::Register {
            agent_id: self.config.agent_id.clone(),
            hostname: system::hostname(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            version: AGENT_VERSION.to_string(),
            ips: system::local_ips(),
        }
    }
}

#[async_trait]
impl MessageSender for TransportController {
    async fn send(&self, message: AgentMessage) -> Result<()> {
        self.writer.send(message).await
    }
}
