//! Transport seam
//!
//! The session manager only ever talks to these two traits. The russh-backed
//! implementation lives in [`super::client`]; tests plug in scripted ones.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::config::SftpConfig;
use super::error::SshError;
use super::handle_owner::PingResult;
use crate::sftp::RemoteFs;

/// Opens authenticated SFTP connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the transport, authenticate and open the SFTP subsystem.
    /// Must give up after `config.ready_timeout()`.
    async fn open(&self, config: &SftpConfig) -> Result<Arc<dyn Connection>, SshError>;
}

/// One live SSH connection carrying an SFTP subsystem
#[async_trait]
pub trait Connection: Send + Sync {
    /// Filesystem handle bound to this connection
    fn fs(&self) -> Arc<dyn RemoteFs>;

    /// Observes `true` once the connection has closed, for any reason
    fn closed(&self) -> watch::Receiver<bool>;

    /// Keepalive round trip
    async fn ping(&self) -> PingResult;

    /// Close the connection and wait until it is released
    async fn close(&self);
}
