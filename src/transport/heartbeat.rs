// src/transport/heartbeat.rs
//! Heartbeat interval and the per-connection heartbeat task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::MessageSender;
use crate::protocol::AgentMessage;

/// Heartbeat period, shared between the receive loop and the heartbeat task
#[derive(Debug)]
pub struct HeartbeatInterval {
    secs: AtomicU64,
}

impl HeartbeatInterval {
    pub fn new(secs: u64) -> Self {
        Self { secs: AtomicU64::new(secs) }
    }

    pub fn get(&self) -> Duration {
        Duration::from_secs(self.secs.load(Ordering::Relaxed))
    }

    /// Apply a registration acknowledgement. Only a successful ack with a
    /// positive interval changes the period.
    pub fn apply_register_ack(&self, success: bool, message: &str, interval_secs: Option<i64>) {
        if !success {
            warn!("Registration rejected by server: {}", message);
            return;
        }

        match interval_secs {
            Some(secs) if secs > 0 => {
                self.secs.store(secs as u64, Ordering::Relaxed);
                info!("Registration acknowledged; heartbeat interval {}s", secs);
            }
            _ => info!("Registration acknowledged"),
        }
    }
}

/// Send a heartbeat every interval until `token` is cancelled.
///
/// The interval is re-read before each wait, so an updated period applies
/// from the next beat. A connection-level send failure cancels `token`,
/// which ends the connection it belongs to.
pub fn spawn_heartbeat(
    sender: Arc<dyn MessageSender>,
    agent_id: String,
    interval: Arc<HeartbeatInterval>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let period = interval.get();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }

            match sender.send(AgentMessage::Heartbeat { agent_id: agent_id.clone() }).await {
                Ok(()) => debug!("Heartbeat sent"),
                Err(e) if e.is_connection_level() => {
                    warn!("Failed to send heartbeat, dropping connection: {}", e);
                    token.cancel();
                    break;
                }
                Err(e) => warn!("Failed to send heartbeat: {}", e),
            }
        }
        debug!("Heartbeat task stopped");
    })
}
