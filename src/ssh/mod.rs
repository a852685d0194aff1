//! SSH module - owns the transport underneath the SFTP session
//!
//! This module provides the SSH connection using the russh library.
//!
//! # Features
//! - Password authentication
//! - Optional host key pinning by SHA256 fingerprint
//! - Single-owner handle task with keepalive probing
//! - `Transport` / `Connection` seam consumed by the session manager

mod client;
mod config;
mod error;
mod handle_owner;
mod transport;

pub use client::{fingerprint, ClientHandler, RusshTransport, SftpConnection};
pub use config::SftpConfig;
pub use error::SshError;
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController, PingResult};
pub use transport::{Connection, Transport};
