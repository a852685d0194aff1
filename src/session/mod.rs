//! Session Management Module
//!
//! Provides the SFTP session manager with:
//! - State machine for the session lifecycle
//! - Single-flight connect
//! - Bounded automatic reconnection with fixed backoff
//! - Ordered connection listeners with panic isolation
//! - Periodic connection health monitoring

pub mod health;
pub mod listener;
mod manager;
mod reconnect;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use health::{check_once, HealthCheck, HealthMonitor, HealthMonitorConfig};
pub use listener::{ConnectionListener, ListenerRemover, ListenerSet};
pub use manager::SftpManager;
pub use reconnect::ReconnectConfig;
pub use types::{SessionState, StatusInfo};
