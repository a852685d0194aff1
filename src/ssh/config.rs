//! SFTP connection configuration

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection configuration consumed by `connect`
///
/// Only these fields are read when opening the transport. Field names accept the
/// camelCase spelling (`readyTimeout`) used by the web layer's config files.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SftpConfig {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for password authentication
    pub username: String,

    /// Password for password authentication
    #[serde(default)]
    pub password: String,

    /// How long to wait for the transport to become ready, in milliseconds
    #[serde(default = "default_ready_timeout", alias = "readyTimeout")]
    pub ready_timeout_ms: u64,

    /// Optional pinned server key fingerprint (`SHA256:<base64>`).
    /// When unset, any host key is accepted.
    #[serde(
        default,
        alias = "hostKeyFingerprint",
        skip_serializing_if = "Option::is_none"
    )]
    pub host_key_fingerprint: Option<String>,
}

impl SftpConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            ready_timeout_ms: default_ready_timeout(),
            host_key_fingerprint: None,
        }
    }

    /// Override the ready timeout
    pub fn with_ready_timeout(mut self, timeout_ms: u64) -> Self {
        self.ready_timeout_ms = timeout_ms;
        self
    }

    /// Pin the server host key
    pub fn with_host_key_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.host_key_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// `host:port` used for logging and address resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Password never reaches the logs
impl fmt::Debug for SftpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ready_timeout_ms", &self.ready_timeout_ms)
            .field("host_key_fingerprint", &self.host_key_fingerprint)
            .finish()
    }
}

fn default_port() -> u16 {
    22
}

fn default_ready_timeout() -> u64 {
    20_000
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
            ready_timeout_ms: default_ready_timeout(),
            host_key_fingerprint: None,
        }
    }
}
