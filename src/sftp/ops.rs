//! Remote filesystem operations
//!
//! Transport-agnostic: everything here only talks to a [`RemoteFs`]. Paths are
//! expected to be normalized already (see [`super::path_utils`]).
//!
//! Recursive helpers return boxed futures so they can call themselves and still
//! be `Send`.

use std::path::Path;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::error::SftpError;
use super::path_utils::{is_same_or_nested, join_remote_path};
use super::remote_fs::RemoteFs;
use super::types::{sort_entries, FileEntry};

/// Buffer size for streaming transfers (256 KB)
pub const STREAM_BUFFER_SIZE: usize = 256 * 1024;

/// List a directory: directories first, then by name
pub async fn list_entries(fs: &dyn RemoteFs, path: &str) -> Result<Vec<FileEntry>, SftpError> {
    let raw = fs.read_dir(path).await?;

    let mut entries: Vec<FileEntry> = raw
        .iter()
        .filter(|e| e.name != "." && e.name != "..")
        .map(|e| FileEntry::from_metadata(e.name.as_str(), &e.metadata))
        .collect();
    sort_entries(&mut entries);

    debug!("Listed {} entries in {}", entries.len(), path);
    Ok(entries)
}

/// Single entry information
pub async fn stat_entry(fs: &dyn RemoteFs, path: &str) -> Result<FileEntry, SftpError> {
    let metadata = fs.stat(path).await?;
    let name = match path.rsplit('/').next() {
        Some("") | None => "/",
        Some(name) => name,
    };
    Ok(FileEntry::from_metadata(name, &metadata))
}

/// True if `path` can be stat'ed. Any failure counts as absent.
pub async fn exists(fs: &dyn RemoteFs, path: &str) -> bool {
    fs.stat(path).await.is_ok()
}

/// Stream a local file to `remote`, overwriting it. Returns bytes written.
pub async fn upload(fs: &dyn RemoteFs, local: &Path, remote: &str) -> Result<u64, SftpError> {
    let local_file = tokio::fs::File::open(local).await?;
    let mut reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, local_file);
    let mut writer = fs.open_write(remote).await?;

    let bytes = tokio::io::copy_buf(&mut reader, &mut writer).await?;
    writer.shutdown().await?;

    info!("Uploaded {} -> {} ({} bytes)", local.display(), remote, bytes);
    Ok(bytes)
}

/// Stream `remote` into a local file. Returns bytes written.
pub async fn download(fs: &dyn RemoteFs, remote: &str, local: &Path) -> Result<u64, SftpError> {
    let remote_file = fs.open_read(remote).await?;
    let mut reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, remote_file);
    let mut local_file = tokio::fs::File::create(local).await?;

    let bytes = tokio::io::copy_buf(&mut reader, &mut local_file).await?;
    local_file.flush().await?;

    info!("Downloaded {} -> {} ({} bytes)", remote, local.display(), bytes);
    Ok(bytes)
}

/// Delete a file, or a directory and everything beneath it (depth-first).
///
/// Returns the number of entries removed, including `path` itself.
pub async fn delete_recursive(fs: &dyn RemoteFs, path: &str) -> Result<u64, SftpError> {
    let metadata = fs.stat(path).await?;
    let removed = remove_entry(fs, path, metadata.is_dir()).await?;
    info!("Deleted {} ({} entries)", path, removed);
    Ok(removed)
}

fn remove_entry<'a>(
    fs: &'a dyn RemoteFs,
    path: &'a str,
    is_dir: bool,
) -> BoxFuture<'a, Result<u64, SftpError>> {
    Box::pin(async move {
        if !is_dir {
            fs.unlink(path).await?;
            return Ok(1);
        }

        let mut removed = 0u64;
        for child in fs.read_dir(path).await? {
            if child.name == "." || child.name == ".." {
                continue;
            }
            let child_path = join_remote_path(path, &child.name);
            removed += remove_entry(fs, &child_path, child.metadata.is_dir()).await?;
        }

        fs.rmdir(path).await?;
        Ok(removed + 1)
    })
}

/// Copy a file or a whole directory tree. Returns the number of files copied.
///
/// The first failure aborts; whatever was already copied stays in place.
pub async fn copy_recursive(
    fs: &dyn RemoteFs,
    source: &str,
    target: &str,
) -> Result<u64, SftpError> {
    if is_same_or_nested(source, target) {
        return Err(SftpError::InvalidPath(format!(
            "cannot copy {} into itself ({})",
            source, target
        )));
    }

    let mut created = Vec::new();
    copy_tracked(fs, source, target, &mut created).await
}

/// Something a copy brought into existence under the target
#[derive(Debug)]
enum Created {
    File(String),
    Dir(String),
}

/// Copy `source` to `target`, appending every path that did not exist before
/// to `created` in creation order. Files that were overwritten are not listed.
async fn copy_tracked(
    fs: &dyn RemoteFs,
    source: &str,
    target: &str,
    created: &mut Vec<Created>,
) -> Result<u64, SftpError> {
    let metadata = fs.stat(source).await?;
    let copied = copy_entry(fs, source, target, metadata.is_dir(), false, created).await?;
    info!("Copied {} -> {} ({} files)", source, target, copied);
    Ok(copied)
}

/// `fresh` means the parent of `target` was created by this copy, so nothing
/// below it can predate the copy.
fn copy_entry<'a>(
    fs: &'a dyn RemoteFs,
    source: &'a str,
    target: &'a str,
    is_dir: bool,
    fresh: bool,
    created: &'a mut Vec<Created>,
) -> BoxFuture<'a, Result<u64, SftpError>> {
    Box::pin(async move {
        if !is_dir {
            let is_new = fresh || !exists(fs, target).await;
            copy_file(fs, source, target, is_new.then_some(&mut *created)).await?;
            return Ok(1);
        }

        let made = ensure_dir(fs, target).await?;
        if made {
            created.push(Created::Dir(target.to_string()));
        }

        let mut copied = 0u64;
        for child in fs.read_dir(source).await? {
            if child.name == "." || child.name == ".." {
                continue;
            }
            let child_source = join_remote_path(source, &child.name);
            let child_target = join_remote_path(target, &child.name);
            copied += copy_entry(
                fs,
                &child_source,
                &child_target,
                child.metadata.is_dir(),
                made,
                &mut *created,
            )
            .await?;
        }
        Ok(copied)
    })
}

/// Make sure `path` is a directory. Returns true if it had to be created.
async fn ensure_dir(fs: &dyn RemoteFs, path: &str) -> Result<bool, SftpError> {
    match fs.stat(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(false),
        Ok(_) => Err(SftpError::InvalidPath(format!(
            "{} exists and is not a directory",
            path
        ))),
        Err(_) => fs.mkdir(path).await.map(|()| true),
    }
}

/// Remote-to-remote stream copy of a single file.
///
/// The target is recorded in `created` as soon as it is opened, so a write
/// that fails halfway still gets rolled back.
async fn copy_file(
    fs: &dyn RemoteFs,
    source: &str,
    target: &str,
    created: Option<&mut Vec<Created>>,
) -> Result<u64, SftpError> {
    let reader = fs.open_read(source).await?;
    let mut reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, reader);
    let mut writer = fs.open_write(target).await?;
    if let Some(created) = created {
        created.push(Created::File(target.to_string()));
    }

    let bytes = tokio::io::copy_buf(&mut reader, &mut writer).await?;
    writer.shutdown().await?;

    debug!("Copied file {} -> {} ({} bytes)", source, target, bytes);
    Ok(bytes)
}

/// Move = copy, then delete the source.
///
/// If the copy fails, every file and directory it created is removed again
/// (best effort, newest first) and the copy error is returned. Anything that
/// was already at the target is left alone. If deleting the source fails, the
/// completed copy is kept and the delete error is returned.
pub async fn move_path(fs: &dyn RemoteFs, source: &str, target: &str) -> Result<(), SftpError> {
    if is_same_or_nested(source, target) {
        return Err(SftpError::InvalidPath(format!(
            "cannot move {} into itself ({})",
            source, target
        )));
    }

    let mut created = Vec::new();
    if let Err(copy_err) = copy_tracked(fs, source, target, &mut created).await {
        warn!("Move {} -> {} failed during copy: {}", source, target, copy_err);
        roll_back(fs, target, &created).await;
        return Err(copy_err);
    }

    delete_recursive(fs, source).await?;
    info!("Moved {} -> {}", source, target);
    Ok(())
}

/// Undo a partial copy. Errors are logged and skipped.
async fn roll_back(fs: &dyn RemoteFs, target: &str, created: &[Created]) {
    if created.is_empty() {
        debug!("Nothing was copied to {}, no cleanup needed", target);
        return;
    }

    let mut failed = 0usize;
    for entry in created.iter().rev() {
        let result = match entry {
            Created::File(path) => fs.unlink(path).await,
            Created::Dir(path) => fs.rmdir(path).await,
        };
        if let Err(e) = result {
            warn!("Failed to clean up {:?}: {}", entry, e);
            failed += 1;
        }
    }

    if failed == 0 {
        info!("Cleaned up partial target {} ({} entries)", target, created.len());
    } else {
        warn!(
            "Partial target {} left behind: {} of {} entries could not be removed",
            target,
            failed,
            created.len()
        );
    }
}
