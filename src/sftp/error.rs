//! SFTP error types

use thiserror::Error;

use crate::ssh::SshError;

#[derive(Error, Debug)]
pub enum SftpError {
    /// Raised by every filesystem operation while the session is not live
    #[error("SFTP session is not connected")]
    NotConnected,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("SFTP protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Transport(#[from] SshError),
}

impl SftpError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, SftpError::NotConnected)
    }

    /// Classify a protocol failure message the way servers usually word it
    pub fn from_protocol(message: impl Into<String>, path: &str) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("no such file") || lower.contains("not found") {
            SftpError::FileNotFound(path.to_string())
        } else if lower.contains("permission denied") {
            SftpError::PermissionDenied(path.to_string())
        } else {
            SftpError::ProtocolError(message)
        }
    }
}

impl serde::Serialize for SftpError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
