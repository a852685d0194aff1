//! SFTP channel wrapper
//!
//! Implements [`RemoteFs`] over a russh-sftp session opened on an existing SSH
//! connection.

use async_trait::async_trait;
use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::FileAttributes;
use tracing::{debug, info, warn};

use super::error::SftpError;
use super::remote_fs::{RemoteFs, RemoteReader, RemoteWriter};
use super::types::{FileType, RawEntry, RemoteMetadata};
use crate::ssh::{HandleController, SshError};

/// SFTP subsystem bound to one SSH connection
pub struct SftpChannel {
    sftp: RusshSftpSession,
    session_id: String,
}

impl SftpChannel {
    /// Open the `sftp` subsystem through the handle owner task
    pub async fn open(
        handle_controller: &HandleController,
        session_id: String,
    ) -> Result<Self, SshError> {
        info!("Opening SFTP subsystem for session {}", session_id);

        let channel = handle_controller.open_session_channel().await?;

        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            SshError::SubsystemNotAvailable(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SshError::SubsystemNotAvailable(e.to_string()))?;

        info!("SFTP subsystem opened for session {}", session_id);
        Ok(Self { sftp, session_id })
    }

    /// Close the SFTP channel; the SSH connection itself stays up
    pub async fn close(&self) {
        if let Err(e) = self.sftp.close().await {
            warn!("Failed to close SFTP channel for session {}: {}", self.session_id, e);
        }
    }

    /// Map SFTP errors to our error type
    fn map_sftp_error(&self, err: SftpErrorInner, path: &str) -> SftpError {
        SftpError::from_protocol(err.to_string(), path)
    }
}

fn to_metadata(attrs: &FileAttributes) -> RemoteMetadata {
    // Symlinks and special files are reported as plain files
    let file_type = if attrs.is_dir() {
        FileType::Directory
    } else {
        FileType::File
    };

    RemoteMetadata {
        file_type,
        size: attrs.size.unwrap_or(0),
        mtime_secs: attrs.mtime.unwrap_or(0),
        permissions: attrs.permissions.unwrap_or(0),
        uid: attrs.uid.unwrap_or(0),
        gid: attrs.gid.unwrap_or(0),
    }
}

#[async_trait]
impl RemoteFs for SftpChannel {
    async fn read_dir(&self, path: &str) -> Result<Vec<RawEntry>, SftpError> {
        debug!("Listing directory: {}", path);

        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))?;

        Ok(read_dir
            .into_iter()
            .filter_map(|entry| {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    return None;
                }
                Some(RawEntry {
                    metadata: to_metadata(&entry.metadata()),
                    name,
                })
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SftpError> {
        let attrs = self
            .sftp
            .symlink_metadata(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))?;
        Ok(to_metadata(&attrs))
    }

    async fn mkdir(&self, path: &str) -> Result<(), SftpError> {
        info!("Creating directory: {}", path);
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))
    }

    async fn rmdir(&self, path: &str) -> Result<(), SftpError> {
        debug!("Removing directory: {}", path);
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))
    }

    async fn unlink(&self, path: &str) -> Result<(), SftpError> {
        debug!("Removing file: {}", path);
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
        info!("Renaming {} to {}", from, to);
        self.sftp
            .rename(from, to)
            .await
            .map_err(|e| self.map_sftp_error(e, from))
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError> {
        let file = self
            .sftp
            .open(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))?;
        Ok(Box::pin(file))
    }

    async fn open_write(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        // create() = CREATE | TRUNCATE | WRITE
        let file = self
            .sftp
            .create(path)
            .await
            .map_err(|e| self.map_sftp_error(e, path))?;
        Ok(Box::pin(file))
    }
}
