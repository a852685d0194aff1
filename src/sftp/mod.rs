//! SFTP file management module
//!
//! Provides remote listing, transfer and the recursive copy / move / delete
//! operations, all written against the [`RemoteFs`] capability.

pub mod error;
#[cfg(test)]
pub(crate) mod memory;
pub mod ops;
pub mod path_utils;
pub mod remote_fs;
pub mod session;
pub mod types;

pub use error::SftpError;
#[cfg(test)]
pub(crate) use memory::{FsOp, MemoryFs};
pub use remote_fs::{RemoteFs, RemoteReader, RemoteWriter};
pub use session::SftpChannel;
pub use types::*;
