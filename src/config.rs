//! Settings loading
//!
//! Settings come from an optional JSON file, then `SFTP_*` environment
//! variables override individual fields.
//!
//! ```json
//! {
//!   "sftp": { "host": "files.internal", "username": "svc", "readyTimeout": 30000 },
//!   "reconnect": { "max_attempts": 5, "interval_ms": 5000 },
//!   "health": { "interval_ms": 30000 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::{HealthMonitorConfig, ReconnectConfig};
use crate::ssh::SftpConfig;

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Missing required setting {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sftp: SftpConfig,
    pub reconnect: ReconnectConfig,
    pub health: HealthMonitorConfig,
}

impl Settings {
    /// Load `path` (if given) and apply the process environment on top
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                debug!("Loading settings from {:?}", path);
                let contents = tokio::fs::read_to_string(path).await?;
                serde_json::from_str::<Settings>(&contents)?
            }
            None => Settings::default(),
        };
        settings.apply_env(|var| std::env::var(var).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Override fields from `lookup` (normally `std::env::var`)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SFTP_HOST") {
            self.sftp.host = host;
        }
        if let Some(port) = parse_var(&lookup, "SFTP_PORT")? {
            self.sftp.port = port;
        }
        if let Some(username) = lookup("SFTP_USERNAME") {
            self.sftp.username = username;
        }
        if let Some(password) = lookup("SFTP_PASSWORD") {
            self.sftp.password = password;
        }
        if let Some(timeout) = parse_var(&lookup, "SFTP_READY_TIMEOUT")? {
            self.sftp.ready_timeout_ms = timeout;
        }
        if let Some(fingerprint) = lookup("SFTP_HOST_KEY_FINGERPRINT") {
            self.sftp.host_key_fingerprint = Some(fingerprint).filter(|f| !f.is_empty());
        }
        if let Some(max) = parse_var(&lookup, "SFTP_MAX_RECONNECT_ATTEMPTS")? {
            self.reconnect.max_attempts = max;
        }
        if let Some(interval) = parse_var(&lookup, "SFTP_RECONNECT_INTERVAL_MS")? {
            self.reconnect.interval_ms = interval;
        }
        if let Some(interval) = parse_var(&lookup, "SFTP_HEALTH_INTERVAL_MS")? {
            self.health.interval_ms = interval;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sftp.host.is_empty() {
            return Err(ConfigError::Missing("SFTP_HOST"));
        }
        if self.sftp.username.is_empty() {
            return Err(ConfigError::Missing("SFTP_USERNAME"));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        None => Ok(None),
    }
}
