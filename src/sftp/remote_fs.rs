//! Remote filesystem capability
//!
//! The recursive operations in [`super::ops`] are written against this trait
//! only, so they run unchanged over a live russh-sftp channel or over the
//! in-memory tree the tests use.

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::SftpError;
use super::types::{RawEntry, RemoteMetadata};

/// Readable remote file stream
pub type RemoteReader = Pin<Box<dyn AsyncRead + Send>>;

/// Writable remote file stream. Callers must `shutdown()` it to commit.
pub type RemoteWriter = Pin<Box<dyn AsyncWrite + Send>>;

#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Directory contents, excluding `.` and `..`
    async fn read_dir(&self, path: &str) -> Result<Vec<RawEntry>, SftpError>;

    /// Attributes of `path` itself (symbolic links are not followed)
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SftpError>;

    async fn mkdir(&self, path: &str) -> Result<(), SftpError>;

    /// Remove an empty directory
    async fn rmdir(&self, path: &str) -> Result<(), SftpError>;

    /// Remove a non-directory entry
    async fn unlink(&self, path: &str) -> Result<(), SftpError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError>;

    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError>;

    /// Create or truncate `path` for writing
    async fn open_write(&self, path: &str) -> Result<RemoteWriter, SftpError>;
}
