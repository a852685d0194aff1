//! Session Types and Data Structures

use serde::{Deserialize, Serialize};

/// Lifecycle state of the managed session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SessionState {
    /// No transport
    #[default]
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// Transport and SFTP channel are up
    Connected,
    /// Waiting out the backoff before reconnect attempt `attempt`
    ReconnectScheduled { attempt: u32 },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::ReconnectScheduled { attempt } => {
                write!(f, "reconnect scheduled (attempt {})", attempt)
            }
        }
    }
}

/// Point-in-time view of the session, safe to hand to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub auto_reconnect: bool,
    pub state: SessionState,
}
