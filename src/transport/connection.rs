// src/transport/connection.rs
// ============================================
// Stream establishment and the shared writer
// ============================================
// - TCP connect, TLS handshake, then the WebSocket upgrade on /agent/stream
// - StreamWriter owns the write half; every outbound frame goes through its
//   lock, so frames from concurrent tasks never interleave
// - The writer is empty between connections and sends fail fast with
//   NotConnected
// ============================================

use async_trait::async_trait;
use futures_util::{Sink, SinkExt};
use rustls::ClientConfig;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{client_async, WebSocketStream};
use tracing::{debug, info, trace};

use super::{tls, MessageSender};
use crate::config::constants::AGENT_STREAM_PATH;
use crate::config::AgentConfig;
use crate::protocol::{agent_message_to_ws, AgentMessage};
use crate::types::{AgentError, Result};

pub type WsSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Stream URL for a server address
pub fn stream_url(server_addr: &str) -> String {
    format!("wss://{}{}", server_addr, AGENT_STREAM_PATH)
}

/// Open a mutually authenticated WebSocket stream to the server
pub async fn open_stream(
    config: &AgentConfig,
    tls_config: Arc<ClientConfig>,
) -> Result<WebSocketStream<TlsStream<TcpStream>>> {
    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .map_err(|e| AgentError::Connection(format!("Failed to connect to {}: {}", config.server_addr, e)))?;
    tcp.set_nodelay(true)?;

    let server_name = tls::server_name(&config.tls_server_name)?;
    let tls_stream = TlsConnector::from(tls_config)
        .connect(server_name, tcp)
        .await
        .map_err(|e| AgentError::Tls(format!("TLS handshake failed: {}", e)))?;

    let url = stream_url(&config.server_addr);
    let (ws_stream, response) = client_async(url.as_str(), tls_stream)
        .await
        .map_err(|e| AgentError::Connection(format!("WebSocket handshake failed: {}", e)))?;

    info!("Connected to {} (HTTP {})", url, response.status());
    Ok(ws_stream)
}

/// Single-writer access to the current stream
pub struct StreamWriter {
    sink: Mutex<Option<WsSink>>,
}

impl StreamWriter {
    pub fn new() -> Self {
        Self { sink: Mutex::new(None) }
    }

    pub(crate) async fn install(&self, sink: WsSink) {
        *self.sink.lock().await = Some(sink);
    }

    /// Drop the current sink, closing it if still possible
    pub(crate) async fn clear(&self) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("Closing stream sink: {}", e);
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    /// Send one raw frame under the writer lock
    pub async fn send_frame(&self, frame: Message) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(AgentError::NotConnected)?;
        sink.send(frame).await?;
        Ok(())
    }
}

impl Default for StreamWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSender for StreamWriter {
    async fn send(&self, message: AgentMessage) -> Result<()> {
        let frame = agent_message_to_ws(&message)?;
        trace!("Sending {} message", message.kind());
        self.send_frame(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::protocol::Role;

    #[test]
    fn test_stream_url() {
        assert_eq!(stream_url("ops.example.com:9090"), "wss://ops.example.com:9090/agent/stream");
    }

    #[tokio::test]
    async fn test_send_without_stream_fails() {
        let writer = StreamWriter::new();
        let result = writer
            .send(AgentMessage::Heartbeat { agent_id: "a".to_string() })
            .await;
        assert!(matches!(result, Err(AgentError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_after_install_and_clear() {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let mut server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;

        let writer = StreamWriter::new();
        let (sink, _stream) = client.split();
        writer.install(Box::pin(sink)).await;
        assert!(writer.is_connected().await);

        writer
            .send(AgentMessage::Heartbeat { agent_id: "agent-7".to_string() })
            .await
            .unwrap();

        match server.next().await {
            Some(Ok(Message::Text(text))) => {
                assert!(text.contains("\"type\":\"heartbeat\""));
                assert!(text.contains("agent-7"));
            }
            other => panic!("Expected heartbeat frame, got {:?}", other),
        }

        writer.clear().await;
        assert!(!writer.is_connected().await);
        assert!(matches!(
            writer.send(AgentMessage::Heartbeat { agent_id: "agent-7".to_string() }).await,
            Err(AgentError::NotConnected)
        ));
    }
}
