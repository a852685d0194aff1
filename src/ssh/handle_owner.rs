//! Handle Owner Task
//!
//! This module implements the "single owner" pattern for SSH Handle.
//!
//! # Architecture
//!
//! Only one task owns the `Handle<ClientHandler>`. The SFTP channel, the
//! keepalive probe and the session manager talk to it through a
//! `HandleController`, which sends commands over an mpsc channel.
//!
//! The task also watches the handle for closure. Once the transport is gone,
//! for whatever reason, the `closed` watch flips to `true` and stays there.
//!
//! # Usage
//!
//! ```ignore
//! let controller = spawn_handle_owner_task(handle, session_id);
//!
//! let channel = controller.open_session_channel().await?;
//! let mut closed = controller.subscribe_closed();
//! ```

use std::time::Duration;

use russh::client::{Handle, Msg};
use russh::Channel;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::client::ClientHandler;
use super::error::SshError;

/// How often the owner checks whether russh has dropped the connection
const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for a single keepalive round trip
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Ping result, separating the different failure reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingResult {
    /// Connection is healthy
    Ok,
    /// No reply in time (may be network latency, can be retried)
    Timeout,
    /// Transport is gone
    IoError,
}

/// Commands sent to the Handle Owner Task
pub enum HandleCommand {
    /// Open a session channel (for the SFTP subsystem)
    ChannelOpenSession {
        reply_tx: oneshot::Sender<Result<Channel<Msg>, russh::Error>>,
    },

    /// Ping the connection (for keepalive check)
    Ping {
        reply_tx: oneshot::Sender<PingResult>,
    },

    /// Disconnect the SSH connection; `ack_tx` fires once the transport is closed
    Disconnect {
        ack_tx: Option<oneshot::Sender<()>>,
    },
}

/// Controller for sending commands to the Handle Owner Task
///
/// Cloning only copies the channel ends. Any holder has full control over the
/// connection, including the ability to disconnect it.
#[derive(Clone)]
pub struct HandleController {
    cmd_tx: mpsc::Sender<HandleCommand>,
    /// Flips to `true` once the owner task has released the handle
    closed_rx: watch::Receiver<bool>,
}

impl HandleController {
    /// Wrap the channel ends of an owner loop.
    ///
    /// `spawn_handle_owner_task` builds its controller through here; tests use
    /// it to drive a stand-in loop.
    pub fn new(cmd_tx: mpsc::Sender<HandleCommand>, closed_rx: watch::Receiver<bool>) -> Self {
        Self { cmd_tx, closed_rx }
    }

    /// Subscribe to transport closure.
    ///
    /// The receiver observes `true` once the connection is gone, whether it was
    /// requested through [`HandleController::disconnect`] or not.
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }

    /// Open a session channel
    pub async fn open_session_channel(&self) -> Result<Channel<Msg>, SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(HandleCommand::ChannelOpenSession { reply_tx })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx
            .await
            .map_err(|_| SshError::Disconnected)?
            .map_err(|e| SshError::ChannelError(e.to_string()))
    }

    /// Disconnect the SSH connection and wait until the handle is released.
    /// Returns immediately if the owner task has already exited.
    pub async fn disconnect(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(HandleCommand::Disconnect {
                ack_tx: Some(ack_tx),
            })
            .await
            .is_err()
        {
            return;
        }
        let _ = ack_rx.await;
    }

    /// Ping the connection (for keepalive check)
    pub async fn ping(&self) -> PingResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(HandleCommand::Ping { reply_tx }).await.is_err() {
            return PingResult::IoError;
        }
        reply_rx.await.unwrap_or(PingResult::IoError)
    }

    /// Check if the Handle Owner Task is still running
    pub fn is_connected(&self) -> bool {
        !self.cmd_tx.is_closed() && !*self.closed_rx.borrow()
    }
}

/// Spawn the Handle Owner Task
///
/// Consumes ownership of the Handle and returns a HandleController for sending commands.
pub fn spawn_handle_owner_task(
    handle: Handle<ClientHandler>,
    session_id: String,
) -> HandleController {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<HandleCommand>(64);
    let (closed_tx, closed_rx) = watch::channel(false);

    tokio::spawn(async move {
        let handle = handle; // Move into task, becomes sole owner
        let mut liveness = tokio::time::interval(LIVENESS_CHECK_INTERVAL);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut disconnect_ack = None;

        info!("Handle owner task started for session {}", session_id);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(HandleCommand::ChannelOpenSession { reply_tx }) => {
                        let result = handle.channel_open_session().await;
                        if reply_tx.send(result).is_err() {
                            warn!("Caller dropped before receiving channel_open_session result");
                        }
                    }

                    Some(HandleCommand::Ping { reply_tx }) => {
                        let _ = reply_tx.send(keepalive(&handle, &session_id).await);
                    }

                    Some(HandleCommand::Disconnect { ack_tx }) => {
                        info!("Disconnect requested for session {}", session_id);
                        disconnect_ack = ack_tx;
                        break;
                    }

                    None => {
                        // All senders dropped
                        info!("All controllers dropped for session {}", session_id);
                        break;
                    }
                },

                _ = liveness.tick() => {
                    if handle.is_closed() {
                        warn!("SSH transport closed by peer for session {}", session_id);
                        break;
                    }
                }
            }
        }

        // === Cleanup phase ===
        closed_tx.send_replace(true);
        drain_pending_commands(&mut cmd_rx);

        let _ = handle
            .disconnect(russh::Disconnect::ByApplication, "Session closed", "en")
            .await;
        if let Some(ack_tx) = disconnect_ack {
            let _ = ack_tx.send(());
        }
        info!("Handle owner task terminated for session {}", session_id);
    });

    HandleController::new(cmd_tx, closed_rx)
}

/// Send `keepalive@openssh.com` with want_reply=true
async fn keepalive(handle: &Handle<ClientHandler>, session_id: &str) -> PingResult {
    debug!("Keepalive probe for session {}", session_id);
    match tokio::time::timeout(KEEPALIVE_TIMEOUT, handle.send_keepalive(true)).await {
        Ok(Ok(())) => {
            debug!("Keepalive OK for session {}", session_id);
            PingResult::Ok
        }
        Ok(Err(e)) => {
            let error_str = format!("{:?}", e);
            if error_str.contains("Disconnect") || error_str.contains("disconnect") {
                warn!("Keepalive SSH disconnect for session {}: {:?}", session_id, e);
                PingResult::IoError
            } else {
                warn!(
                    "Keepalive SSH error for session {} (treating as soft failure): {:?}",
                    session_id, e
                );
                PingResult::Timeout
            }
        }
        Err(_) => {
            warn!("Keepalive timeout for session {} (5s)", session_id);
            PingResult::Timeout
        }
    }
}

/// Drain all pending commands, returning Disconnected error to each
fn drain_pending_commands(cmd_rx: &mut mpsc::Receiver<HandleCommand>) {
    // Close receiver first, prevent new messages
    cmd_rx.close();

    while let Ok(cmd) = cmd_rx.try_recv() {
        match cmd {
            HandleCommand::ChannelOpenSession { reply_tx } => {
                let _ = reply_tx.send(Err(russh::Error::Disconnect));
            }
            HandleCommand::Ping { reply_tx } => {
                let _ = reply_tx.send(PingResult::IoError);
            }
            HandleCommand::Disconnect { ack_tx } => {
                // Already disconnecting
                if let Some(ack_tx) = ack_tx {
                    let _ = ack_tx.send(());
                }
            }
        }
    }
}
