//! SSH Client implementation using russh

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use russh::client;
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::SftpConfig;
use super::error::SshError;
use super::handle_owner::{spawn_handle_owner_task, HandleController, PingResult};
use super::transport::{Connection, Transport};
use crate::sftp::{RemoteFs, SftpChannel};

/// Compute SHA256 fingerprint of public key (`SHA256:<base64>`, unpadded)
pub fn fingerprint(key: &PublicKey) -> String {
    let key_bytes = key.public_key_bytes();
    let mut hasher = Sha256::new();
    hasher.update(&key_bytes);
    let hash = hasher.finalize();
    format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
}

/// Compare fingerprints ignoring the `SHA256:` prefix and base64 padding
fn fingerprints_match(pinned: &str, actual: &str) -> bool {
    fn strip(fp: &str) -> &str {
        fp.trim()
            .trim_start_matches("SHA256:")
            .trim_end_matches('=')
    }
    strip(pinned) == strip(actual)
}

/// Opens SFTP connections over russh with password authentication
pub struct RusshTransport {
    ssh_config: Arc<client::Config>,
}

impl RusshTransport {
    pub fn new() -> Self {
        // Keepalives stay on so russh itself notices a dead peer
        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };
        Self {
            ssh_config: Arc::new(ssh_config),
        }
    }

    async fn establish(&self, config: &SftpConfig) -> Result<SftpConnection, SshError> {
        let addr = config.address();
        let session_id = uuid::Uuid::new_v4().to_string();

        info!("Connecting to SSH server at {} (session {})", addr, session_id);

        let socket_addr = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| SshError::ConnectionFailed(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::ConnectionFailed("No address found".to_string()))?;

        let handler = ClientHandler::new(
            config.host.clone(),
            config.port,
            config.host_key_fingerprint.clone(),
        );

        let mut handle = client::connect(self.ssh_config.clone(), socket_addr, handler)
            .await
            .map_err(|e| match e {
                SshError::HostKeyMismatch { .. } => e,
                other => SshError::ConnectionFailed(other.to_string()),
            })?;

        debug!("SSH handshake completed");

        let authenticated = handle
            .authenticate_password(&config.username, &config.password)
            .await
            .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        info!("SSH authentication successful for {}@{}", config.username, addr);

        let controller = spawn_handle_owner_task(handle, session_id.clone());

        let sftp = match SftpChannel::open(&controller, session_id.clone()).await {
            Ok(sftp) => sftp,
            Err(e) => {
                controller.disconnect().await;
                return Err(e);
            }
        };

        Ok(SftpConnection {
            controller,
            sftp: Arc::new(sftp),
            session_id,
        })
    }
}

impl Default for RusshTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn open(&self, config: &SftpConfig) -> Result<Arc<dyn Connection>, SshError> {
        let connection = tokio::time::timeout(config.ready_timeout(), self.establish(config))
            .await
            .map_err(|_| {
                SshError::Timeout(format!(
                    "{} not ready after {}ms",
                    config.address(),
                    config.ready_timeout_ms
                ))
            })??;
        Ok(Arc::new(connection))
    }
}

/// Live SSH connection with its SFTP channel
pub struct SftpConnection {
    controller: HandleController,
    sftp: Arc<SftpChannel>,
    session_id: String,
}

#[async_trait]
impl Connection for SftpConnection {
    fn fs(&self) -> Arc<dyn RemoteFs> {
        self.sftp.clone()
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.controller.subscribe_closed()
    }

    async fn ping(&self) -> PingResult {
        self.controller.ping().await
    }

    async fn close(&self) {
        debug!("Closing SFTP connection {}", self.session_id);
        if self.controller.is_connected() {
            self.sftp.close().await;
        }
        self.controller.disconnect().await;
    }
}

/// Client handler for russh callbacks
///
/// Verifies the server key against an optional pinned fingerprint. Without a
/// pin every key is accepted and its fingerprint is logged.
pub struct ClientHandler {
    host: String,
    port: u16,
    expected_fingerprint: Option<String>,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, expected_fingerprint: Option<String>) -> Self {
        Self {
            host,
            port,
            expected_fingerprint,
        }
    }

    fn verify(&self, actual: String) -> Result<bool, SshError> {
        match &self.expected_fingerprint {
            Some(expected) if !fingerprints_match(expected, &actual) => {
                warn!(
                    "HOST KEY MISMATCH for {}:{}! Expected {}, got {}",
                    self.host, self.port, expected, actual
                );
                Err(SshError::HostKeyMismatch {
                    expected: expected.clone(),
                    actual,
                })
            }
            Some(_) => {
                info!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            None => {
                info!(
                    "Accepting host key for {}:{} (fingerprint: {})",
                    self.host, self.port, actual
                );
                Ok(true)
            }
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        self.verify(fingerprint(server_public_key))
    }
}
