//! OxideSFTP - SFTP session manager
//!
//! One long-lived SFTP session with single-flight connect, bounded automatic
//! reconnection, connection listeners, a health monitor and recursive remote
//! filesystem operations. Built on russh / russh-sftp.

pub mod config;
pub mod session;
pub mod sftp;
pub mod ssh;

pub use config::{ConfigError, Settings};
pub use session::{
    ConnectionListener, HealthMonitor, HealthMonitorConfig, ListenerRemover, ReconnectConfig,
    SessionState, SftpManager, StatusInfo,
};
pub use sftp::{FileEntry, FileType, SftpError};
pub use ssh::{RusshTransport, SftpConfig, SshError};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// Honors `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
