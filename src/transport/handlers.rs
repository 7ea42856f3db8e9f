// src/transport/handlers.rs
// Routing of server messages received on one connection.
//
// Terminal messages are routed to one ordered lane per session, so
// Open/Input/Resize/Close for a session are applied in arrival order while
// a slow session never holds up another. A lane retired by Close is awaited
// by the next lane for the same id.
// File and command requests each run on their own task, bounded by a
// semaphore, and reply through the shared writer.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

use super::heartbeat::HeartbeatInterval;
use super::MessageSender;
use crate::protocol::{AgentMessage, ServerMessage};
use crate::remote_command_handler::RemoteCommandHandler;
use crate::terminal::TerminalSessionManager;

pub(crate) struct Dispatcher {
    commands: Arc<RemoteCommandHandler>,
    sender: Arc<dyn MessageSender>,
    heartbeat: Arc<HeartbeatInterval>,
    limit: Arc<Semaphore>,
    terminal_lane: mpsc::UnboundedSender<ServerMessage>,
}

impl Dispatcher {
    /// Create a dispatcher and start its terminal router
    pub(crate) fn start(
        terminals: Arc<TerminalSessionManager>,
        commands: Arc<RemoteCommandHandler>,
        sender: Arc<dyn MessageSender>,
        heartbeat: Arc<HeartbeatInterval>,
        limit: Arc<Semaphore>,
    ) -> (Self, JoinHandle<()>) {
        let (lane_tx, lane_rx) = mpsc::unbounded_channel();
        let lane = spawn_terminal_router(terminals, lane_rx);

        let dispatcher = Self {
            commands,
            sender,
            heartbeat,
            limit,
            terminal_lane: lane_tx,
        };
        (dispatcher, lane)
    }

    /// Route one server message. Never blocks on request processing.
    pub(crate) fn dispatch(&self, message: ServerMessage) {
        match message {
            ServerMessage::RegisterAck {
                success,
                message,
                heartbeat_interval_seconds,
            } => self.heartbeat.apply_register_ack(success, &message, heartbeat_interval_seconds),

            ServerMessage::HeartbeatAck {} => debug!("Heartbeat acknowledged"),

            message if message.is_terminal() => {
                if self.terminal_lane.send(message).is_err() {
                    warn!("Terminal lane stopped; dropping terminal message");
                }
            }

            ServerMessage::FileRequest {
                request_id,
                action,
                path,
                filename,
                data,
            } => {
                let commands = self.commands.clone();
                let span = tracing::info_span!("file_request", %request_id, %action);
                self.spawn_request(
                    async move {
                        match commands
                            .handle_file_request(&request_id, &action, &path, &filename, &data)
                            .await
                        {
                            Ok(response) => response,
                            Err(e) => {
                                warn!("File request failed: {}", e);
                                AgentMessage::file_error(request_id, e.to_string())
                            }
                        }
                    }
                    .instrument(span),
                );
            }

            ServerMessage::CmdRequest {
                request_id,
                command,
                timeout_seconds,
            } => {
                let commands = self.commands.clone();
                let span = tracing::info_span!("cmd_request", %request_id);
                self.spawn_request(
                    async move { commands.execute(&request_id, &command, timeout_seconds).await }.instrument(span),
                );
            }

            ServerMessage::Unknown => debug!("Ignoring unknown message type"),

            // Terminal variants are matched by the guard above.
            other => debug!("Unhandled message: {:?}", other),
        }
    }

    /// Run a request on its own task once a dispatch slot is free and send
    /// its response
    fn spawn_request<F>(&self, request: F)
    where
        F: std::future::Future<Output = AgentMessage> + Send + 'static,
    {
        let limit = self.limit.clone();
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let _permit = match limit.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let response = request.await;
            let kind = response.kind();
            if let Err(e) = sender.send(response).await {
                warn!("Failed to send {} response: {}", kind, e);
            }
        });
    }
}

/// Ordered queue of terminal messages for one session
struct Lane {
    /// `None` once Close has been queued
    tx: Option<mpsc::UnboundedSender<ServerMessage>>,
    handle: JoinHandle<()>,
}

/// Fan terminal messages out to per-session lanes.
///
/// Returns once the dispatcher is dropped and every lane has drained.
fn spawn_terminal_router(
    terminals: Arc<TerminalSessionManager>,
    mut router_rx: mpsc::UnboundedReceiver<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lanes: HashMap<String, Lane> = HashMap::new();

        while let Some(message) = router_rx.recv().await {
            let Some(session_id) = message.session_id().map(str::to_string) else {
                continue;
            };
            let closing = matches!(message, ServerMessage::TermClose { .. });

            let mut lane = match lanes.remove(&session_id) {
                Some(lane) if lane.tx.is_some() => lane,
                retired => spawn_lane(terminals.clone(), &session_id, retired.map(|lane| lane.handle)),
            };

            if let Some(tx) = &lane.tx {
                if tx.send(message).is_err() {
                    warn!("Lane for session {} stopped; dropping terminal message", session_id);
                }
            }
            if closing {
                lane.tx = None;
            }
            lanes.insert(session_id, lane);

            lanes.retain(|_, lane| lane.tx.is_some() || !lane.handle.is_finished());
        }

        for (session_id, lane) in lanes {
            drop(lane.tx);
            if let Err(e) = lane.handle.await {
                debug!("Lane for session {} ended abnormally: {}", session_id, e);
            }
        }
        debug!("Terminal router stopped");
    })
}

/// Start a lane for `session_id`; it waits for `previous` before applying
/// anything
fn spawn_lane(terminals: Arc<TerminalSessionManager>, session_id: &str, previous: Option<JoinHandle<()>>) -> Lane {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let span = tracing::debug_span!("terminal_lane", %session_id);

    let handle = tokio::spawn(
        async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            while let Some(message) = rx.recv().await {
                if let Err(e) = terminals.handle_terminal_message(message).await {
                    warn!("Terminal request failed: {}", e);
                }
            }
        }
        .instrument(span),
    );

    Lane { tx: Some(tx), handle }
}
