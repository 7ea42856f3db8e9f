// src/terminal/mod.rs
// ============================================
// SREHub Agent - PTY Session Manager
// ============================================
// Architecture Overview:
// - One login shell per session, attached to its own pseudo-terminal
// - Blocking PTY reads run on a dedicated thread per session and feed an
//   async forwarder over a bounded channel, so output keeps its read order
// - Input is queued to a writer thread per session; a shell that stops
//   reading stalls only its own writer, never the caller
// - A reaper thread per session waits for the shell and raises the
//   completion signal
// - The session map is behind an async RwLock: lookups share it, open and
//   close take it exclusively
// - When a shell's output stream ends the forwarder drops the session from
//   the map itself, so a dead shell never lingers until the server closes it
// ============================================

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::config::constants::{
    PTY_OUTPUT_CHANNEL_SIZE, PTY_READ_CHUNK_SIZE, SESSION_REAP_TIMEOUT, TERM_ENV,
};
use crate::protocol::{AgentMessage, ServerMessage};
use crate::transport::MessageSender;
use crate::types::{AgentError, Result};

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

type SessionMap = Arc<RwLock<HashMap<String, Arc<TerminalSession>>>>;

/// Terminal session manager
pub struct TerminalSessionManager {
    sessions: SessionMap,
    sender: Arc<dyn MessageSender>,
    shell: String,
    metrics: Arc<TerminalMetrics>,
}

/// Lifetime counters
#[derive(Default)]
struct TerminalMetrics {
    sessions_created: AtomicU64,
    sessions_closed: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

/// One interactive shell on a pseudo-terminal
pub struct TerminalSession {
    pub session_id: String,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    /// Queue to the writer thread; `None` once the session is released
    input: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    /// Flips to true once the shell process has exited
    exited: watch::Receiver<bool>,
}

/// Freshly spawned shell and the handles to drive it
struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
}

impl TerminalSessionManager {
    /// Create a new terminal session manager
    pub fn new(sender: Arc<dyn MessageSender>, shell: impl Into<String>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            sender,
            shell: shell.into(),
            metrics: Arc::new(TerminalMetrics::default()),
        }
    }

    /// Open a login shell for `session_id`.
    ///
    /// A live session already registered under the same identifier is
    /// closed (PTY released, shell killed and reaped) and replaced.
    #[instrument(skip(self))]
    pub async fn open(&self, session_id: &str, cols: u16, rows: u16) -> Result<()> {
        if self.has_session(session_id).await {
            warn!("Session {} reopened; closing the previous shell", session_id);
            self.close(session_id).await?;
        }

        let size = pty_size(cols, rows);

        let shell = self.shell.clone();
        let handle = tokio::task::spawn_blocking(move || Self::create_pty(&shell, size))
            .await
            .map_err(|e| AgentError::Pty(format!("PTY creation task failed: {}", e)))??;

        let PtyHandle { master, mut child, reader, writer } = handle;
        let killer = child.clone_killer();
        let (exited_tx, exited_rx) = watch::channel(false);
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let session = Arc::new(TerminalSession {
            session_id: session_id.to_string(),
            master: Mutex::new(Some(master)),
            input: Mutex::new(Some(input_tx)),
            killer: Mutex::new(killer),
            exited: exited_rx,
        });

        // Reaper: raises the completion signal when the shell exits.
        let reaper_id = session_id.to_string();
        thread::Builder::new()
            .name(format!("pty-reap-{}", session_id))
            .spawn(move || {
                match child.wait() {
                    Ok(status) => debug!("Shell for session {} exited: {:?}", reaper_id, status),
                    Err(e) => warn!("Failed to wait for shell of session {}: {}", reaper_id, e),
                }
                let _ = exited_tx.send(true);
            })
            .map_err(|e| AgentError::Pty(format!("Failed to spawn reaper thread: {}", e)))?;

        let (output_tx, output_rx) = mpsc::channel(PTY_OUTPUT_CHANNEL_SIZE);
        let threads = Self::spawn_reader_thread(session_id, reader, output_tx)
            .and_then(|_| self.spawn_writer_thread(session_id, writer, input_rx));
        if let Err(e) = threads {
            if let Ok(mut killer) = session.killer.lock() {
                let _ = killer.kill();
            }
            return Err(e);
        }

        let previous = self
            .sessions
            .write()
            .await
            .insert(session_id.to_string(), session.clone());

        // Only reachable if another Open for the same id raced this one.
        if let Some(previous) = previous {
            self.teardown(previous).await;
        }

        self.spawn_output_forwarder(session, output_rx);
        self.metrics.sessions_created.fetch_add(1, Ordering::Relaxed);

        info!("Terminal session opened: {} ({}x{})", session_id, size.cols, size.rows);
        Ok(())
    }

    /// Create PTY and spawn the shell
    fn create_pty(shell: &str, size: PtySize) -> Result<PtyHandle> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(size)
            .map_err(|e| AgentError::Pty(format!("Failed to create PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.arg("-l");
        cmd.env("TERM", TERM_ENV);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| AgentError::Pty(format!("Failed to spawn shell: {}", e)))?;

        // Only the child keeps the slave side open.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| AgentError::Pty(format!("Failed to clone PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| AgentError::Pty(format!("Failed to take PTY writer: {}", e)))?;

        Ok(PtyHandle {
            master: pair.master,
            child,
            reader,
            writer,
        })
    }

    /// Blocking read loop: one chunk per read, until EOF or error
    fn spawn_reader_thread(
        session_id: &str,
        mut reader: Box<dyn Read + Send>,
        output_tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<()> {
        let id = session_id.to_string();
        thread::Builder::new()
            .name(format!("pty-read-{}", session_id))
            .spawn(move || {
                let mut buffer = vec![0u8; PTY_READ_CHUNK_SIZE];
                loop {
                    match reader.read(&mut buffer) {
                        Ok(0) => {
                            debug!("PTY reader: EOF for session {}", id);
                            break;
                        }
                        Ok(n) => {
                            if output_tx.blocking_send(buffer[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            // EIO is how Linux reports a hung-up PTY.
                            debug!("PTY reader for session {} ended: {}", id, e);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| AgentError::Pty(format!("Failed to spawn reader thread: {}", e)))?;
        Ok(())
    }

    /// Blocking write loop: applies queued input in order until the queue
    /// closes or the PTY rejects a write
    fn spawn_writer_thread(
        &self,
        session_id: &str,
        mut writer: Box<dyn Write + Send>,
        mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Result<()> {
        let id = session_id.to_string();
        let metrics = self.metrics.clone();
        thread::Builder::new()
            .name(format!("pty-write-{}", session_id))
            .spawn(move || {
                while let Some(data) = input_rx.blocking_recv() {
                    if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                        debug!("PTY writer for session {} ended: {}", id, e);
                        break;
                    }
                    metrics.bytes_written.fetch_add(data.len() as u64, Ordering::Relaxed);
                }
            })
            .map_err(|e| AgentError::Pty(format!("Failed to spawn writer thread: {}", e)))?;
        Ok(())
    }

    /// Forward PTY output upstream in read order, then retire the session
    fn spawn_output_forwarder(&self, session: Arc<TerminalSession>, mut output_rx: mpsc::Receiver<Vec<u8>>) {
        let sessions = self.sessions.clone();
        let sender = self.sender.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let session_id = session.session_id.clone();
            let mut total_bytes = 0u64;

            while let Some(data) = output_rx.recv().await {
                total_bytes += data.len() as u64;
                metrics.bytes_read.fetch_add(data.len() as u64, Ordering::Relaxed);

                let message = AgentMessage::TermOutput {
                    session_id: session_id.clone(),
                    data,
                };
                if let Err(e) = sender.send(message).await {
                    debug!("Dropped output for session {}: {}", session_id, e);
                }
            }

            // Output stream ended. Drop the map entry unless Close (or a
            // reopen under the same id) already replaced it.
            let removed = {
                let mut map = sessions.write().await;
                let is_current = map
                    .get(&session_id)
                    .map_or(false, |current| Arc::ptr_eq(current, &session));
                if is_current {
                    map.remove(&session_id)
                } else {
                    None
                }
            };

            if let Some(session) = removed {
                info!("Shell for session {} ended; session removed", session_id);
                session.release();
                metrics.sessions_closed.fetch_add(1, Ordering::Relaxed);
            }

            info!("Output forwarder stopped for session {} (total bytes: {})", session_id, total_bytes);
        });
    }

    /// Queue raw input for the session's PTY.
    ///
    /// Returns once the bytes are queued; the writer thread applies them in
    /// order.
    #[instrument(skip(self, data))]
    pub async fn input(&self, session_id: &str, data: Vec<u8>) -> Result<()> {
        let session = self.get(session_id).await?;
        let len = data.len();

        session.queue_input(data)?;
        debug!("Queued {} bytes for terminal {}", len, session_id);
        Ok(())
    }

    /// Update the PTY window size. Zero dimensions fall back to the defaults.
    #[instrument(skip(self))]
    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<()> {
        let session = self.get(session_id).await?;
        session.resize(pty_size(cols, rows))?;

        debug!("Resized terminal {} to {}x{}", session_id, cols, rows);
        Ok(())
    }

    /// Close a session. Unknown identifiers are a no-op.
    #[instrument(skip(self))]
    pub async fn close(&self, session_id: &str) -> Result<()> {
        let session = self.sessions.write().await.remove(session_id);

        match session {
            Some(session) => {
                self.teardown(session).await;
                info!("Terminal session closed: {}", session_id);
            }
            None => debug!("Close for unknown session {} ignored", session_id),
        }
        Ok(())
    }

    /// Close every live session
    pub async fn close_all(&self) {
        let drained: Vec<Arc<TerminalSession>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, session)| session).collect()
        };

        for session in drained {
            let id = session.session_id.clone();
            self.teardown(session).await;
            info!("Terminal session closed on shutdown: {}", id);
        }

        let stats = self.stats();
        info!(
            "Terminal sessions: {} created, {} closed, {} bytes in, {} bytes out",
            stats.0, stats.1, stats.2, stats.3
        );
    }

    /// Kill the shell, release the PTY and wait for the shell to be reaped.
    ///
    /// Never waits on a pending write: the kill hangs up the terminal, which
    /// fails any write still blocked in the writer thread.
    async fn teardown(&self, session: Arc<TerminalSession>) {
        if let Ok(mut killer) = session.killer.lock() {
            if let Err(e) = killer.kill() {
                debug!("Kill for session {} failed (likely already exited): {}", session.session_id, e);
            }
        }

        session.release();

        let mut exited = session.exited.clone();
        let wait = async move {
            while !*exited.borrow() {
                if exited.changed().await.is_err() {
                    break;
                }
            }
        };
        if tokio::time::timeout(SESSION_REAP_TIMEOUT, wait).await.is_err() {
            error!("Shell for session {} did not exit within {:?}", session.session_id, SESSION_REAP_TIMEOUT);
        }

        self.metrics.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Route one terminal request from the server
    pub async fn handle_terminal_message(&self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::TermOpen { session_id, cols, rows } => self.open(&session_id, cols, rows).await,
            ServerMessage::TermInput { session_id, data } => self.input(&session_id, data).await,
            ServerMessage::TermResize { session_id, cols, rows } => self.resize(&session_id, cols, rows).await,
            ServerMessage::TermClose { session_id } => self.close(&session_id).await,
            other => Err(AgentError::Pty(format!("Not a terminal message: {:?}", other))),
        }
    }

    async fn get(&self, session_id: &str) -> Result<Arc<TerminalSession>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))
    }

    /// Get session count
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Check if session exists
    pub async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// (sessions created, sessions closed, bytes written, bytes read)
    pub fn stats(&self) -> (u64, u64, u64, u64) {
        (
            self.metrics.sessions_created.load(Ordering::Relaxed),
            self.metrics.sessions_closed.load(Ordering::Relaxed),
            self.metrics.bytes_written.load(Ordering::Relaxed),
            self.metrics.bytes_read.load(Ordering::Relaxed),
        )
    }
}

/// PTY dimensions, with zero rows or columns replaced by the defaults
fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows: if rows == 0 { DEFAULT_ROWS } else { rows },
        cols: if cols == 0 { DEFAULT_COLS } else { cols },
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl TerminalSession {
    fn queue_input(&self, data: Vec<u8>) -> Result<()> {
        let guard = self
            .input
            .lock()
            .map_err(|_| AgentError::Pty("PTY input lock poisoned".to_string()))?;
        let input = guard
            .as_ref()
            .ok_or_else(|| AgentError::SessionNotFound(self.session_id.clone()))?;
        input
            .send(data)
            .map_err(|_| AgentError::Pty(format!("PTY writer for session {} has stopped", self.session_id)))
    }

    fn resize(&self, size: PtySize) -> Result<()> {
        let guard = self
            .master
            .lock()
            .map_err(|_| AgentError::Pty("PTY master lock poisoned".to_string()))?;
        let master = guard
            .as_ref()
            .ok_or_else(|| AgentError::SessionNotFound(self.session_id.clone()))?;
        master
            .resize(size)
            .map_err(|e| AgentError::Pty(format!("Failed to resize PTY: {}", e)))
    }

    /// Close the input queue and the PTY master held by this session
    fn release(&self) {
        if let Ok(mut input) = self.input.lock() {
            input.take();
        }
        if let Ok(mut master) = self.master.lock() {
            master.take();
        }
    }
}
