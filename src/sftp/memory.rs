//! In-memory remote filesystem
//!
//! Implements [`RemoteFs`] over a path-keyed tree. Every call is appended to an
//! operation log and individual calls can be scripted to fail, which lets the
//! recursive operations and the session manager be tested without a server.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWrite;

use super::error::SftpError;
use super::path_utils::{is_same_or_nested, normalize_remote_path, parent_remote_path};
use super::remote_fs::{RemoteFs, RemoteReader, RemoteWriter};
use super::types::{FileType, RawEntry, RemoteMetadata};

/// A recorded filesystem call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FsOp {
    ReadDir(String),
    Stat(String),
    Mkdir(String),
    Rmdir(String),
    Unlink(String),
    Rename(String, String),
    OpenRead(String),
    OpenWrite(String),
}

#[derive(Debug, Clone)]
enum Node {
    Dir { mtime: u32 },
    File { data: Vec<u8>, mtime: u32 },
}

impl Node {
    fn metadata(&self) -> RemoteMetadata {
        match self {
            Node::Dir { mtime } => RemoteMetadata {
                file_type: FileType::Directory,
                size: 4096,
                mtime_secs: *mtime,
                permissions: 0o040755,
                uid: 1000,
                gid: 1000,
            },
            Node::File { data, mtime } => RemoteMetadata {
                file_type: FileType::File,
                size: data.len() as u64,
                mtime_secs: *mtime,
                permissions: 0o100644,
                uid: 1000,
                gid: 1000,
            },
        }
    }
}

#[derive(Debug)]
struct MemoryState {
    nodes: BTreeMap<String, Node>,
    ops: Vec<FsOp>,
    failures: HashMap<FsOp, String>,
    clock: u32,
}

impl MemoryState {
    fn record(&mut self, op: FsOp) -> Result<(), SftpError> {
        self.ops.push(op.clone());
        match self.failures.get(&op) {
            Some(message) => Err(SftpError::ProtocolError(message.clone())),
            None => Ok(()),
        }
    }

    fn tick(&mut self) -> u32 {
        self.clock += 1;
        self.clock
    }

    fn require_dir(&self, path: &str) -> Result<(), SftpError> {
        match self.nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(Node::File { .. }) => {
                Err(SftpError::ProtocolError(format!("Not a directory: {}", path)))
            }
            None => Err(SftpError::FileNotFound(path.to_string())),
        }
    }

    fn has_children(&self, path: &str) -> bool {
        self.nodes
            .keys()
            .any(|k| k != path && parent_remote_path(k) == path)
    }
}

/// In-memory [`RemoteFs`]; clones share the same tree
#[derive(Debug, Clone)]
pub struct MemoryFs {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFs {
    /// Empty filesystem containing only `/`
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir { mtime: 0 });
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                nodes,
                ops: Vec::new(),
                failures: HashMap::new(),
                clock: 1_700_000_000,
            })),
        }
    }

    /// Create a directory and any missing parents
    pub fn with_dir(self, path: &str) -> Self {
        self.insert_dir_all(&normalize_remote_path(path));
        self
    }

    /// Create a file (and missing parent directories) with the given content
    pub fn with_file(self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        let path = normalize_remote_path(path);
        self.insert_dir_all(parent_remote_path(&path));
        let mut state = self.state.lock();
        let mtime = state.tick();
        state.nodes.insert(
            path,
            Node::File {
                data: content.into(),
                mtime,
            },
        );
        drop(state);
        self
    }

    fn insert_dir_all(&self, path: &str) {
        let mut state = self.state.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            if !state.nodes.contains_key(&current) {
                let mtime = state.tick();
                state.nodes.insert(current.clone(), Node::Dir { mtime });
            }
        }
    }

    /// Make the given call fail with a protocol error
    pub fn fail_on(&self, op: FsOp, message: impl Into<String>) {
        self.state.lock().failures.insert(op, message.into());
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// All calls made so far, in order
    pub fn ops(&self) -> Vec<FsOp> {
        self.state.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state
            .lock()
            .nodes
            .contains_key(&normalize_remote_path(path))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(
            self.state.lock().nodes.get(&normalize_remote_path(path)),
            Some(Node::Dir { .. })
        )
    }

    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.lock().nodes.get(&normalize_remote_path(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Every path at or below `root`, sorted
    pub fn paths_under(&self, root: &str) -> Vec<String> {
        let root = normalize_remote_path(root);
        self.state
            .lock()
            .nodes
            .keys()
            .filter(|k| is_same_or_nested(&root, k))
            .cloned()
            .collect()
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn read_dir(&self, path: &str) -> Result<Vec<RawEntry>, SftpError> {
        let mut state = self.state.lock();
        state.record(FsOp::ReadDir(path.to_string()))?;
        state.require_dir(path)?;

        Ok(state
            .nodes
            .iter()
            .filter(|(k, _)| k.as_str() != path && parent_remote_path(k) == path)
            .map(|(k, node)| RawEntry {
                name: k.rsplit('/').next().unwrap_or_default().to_string(),
                metadata: node.metadata(),
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SftpError> {
        let mut state = self.state.lock();
        state.record(FsOp::Stat(path.to_string()))?;
        state
            .nodes
            .get(path)
            .map(Node::metadata)
            .ok_or_else(|| SftpError::FileNotFound(path.to_string()))
    }

    async fn mkdir(&self, path: &str) -> Result<(), SftpError> {
        let mut state = self.state.lock();
        state.record(FsOp::Mkdir(path.to_string()))?;
        if state.nodes.contains_key(path) {
            return Err(SftpError::ProtocolError(format!("Failure: {} exists", path)));
        }
        state.require_dir(parent_remote_path(path))?;
        let mtime = state.tick();
        state.nodes.insert(path.to_string(), Node::Dir { mtime });
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> Result<(), SftpError> {
        let mut state = self.state.lock();
        state.record(FsOp::Rmdir(path.to_string()))?;
        state.require_dir(path)?;
        if state.has_children(path) {
            return Err(SftpError::ProtocolError(format!(
                "Directory not empty: {}",
                path
            )));
        }
        state.nodes.remove(path);
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), SftpError> {
        let mut state = self.state.lock();
        state.record(FsOp::Unlink(path.to_string()))?;
        match state.nodes.get(path) {
            Some(Node::File { .. }) => {
                state.nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(SftpError::ProtocolError(format!(
                "Is a directory: {}",
                path
            ))),
            None => Err(SftpError::FileNotFound(path.to_string())),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
        let mut state = self.state.lock();
        state.record(FsOp::Rename(from.to_string(), to.to_string()))?;
        if !state.nodes.contains_key(from) {
            return Err(SftpError::FileNotFound(from.to_string()));
        }
        if state.nodes.contains_key(to) {
            return Err(SftpError::ProtocolError(format!("Failure: {} exists", to)));
        }
        state.require_dir(parent_remote_path(to))?;

        let moved: Vec<String> = state
            .nodes
            .keys()
            .filter(|k| is_same_or_nested(from, k))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = state.nodes.remove(&old) {
                let new = format!("{}{}", to, &old[from.len()..]);
                state.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError> {
        let mut state = self.state.lock();
        state.record(FsOp::OpenRead(path.to_string()))?;
        match state.nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(Box::pin(Cursor::new(data.clone()))),
            Some(Node::Dir { .. }) => Err(SftpError::ProtocolError(format!(
                "Is a directory: {}",
                path
            ))),
            None => Err(SftpError::FileNotFound(path.to_string())),
        }
    }

    async fn open_write(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        let mut state = self.state.lock();
        state.record(FsOp::OpenWrite(path.to_string()))?;
        if let Some(Node::Dir { .. }) = state.nodes.get(path) {
            return Err(SftpError::ProtocolError(format!(
                "Is a directory: {}",
                path
            )));
        }
        state.require_dir(parent_remote_path(path))?;
        let mtime = state.tick();
        state.nodes.insert(
            path.to_string(),
            Node::File {
                data: Vec::new(),
                mtime,
            },
        );
        Ok(Box::pin(MemoryWriter {
            state: Arc::clone(&self.state),
            path: path.to_string(),
        }))
    }
}

/// Appends straight into the tree, so partially written files are visible
struct MemoryWriter {
    state: Arc<Mutex<MemoryState>>,
    path: String,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock();
        match state.nodes.get_mut(&self.path) {
            Some(Node::File { data, .. }) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} was removed while writing", self.path),
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_read_dir_lists_direct_children_only() {
        let fs = MemoryFs::new()
            .with_file("/a/one.txt", "1")
            .with_file("/a/sub/two.txt", "2");
        let mut names: Vec<_> = fs
            .read_dir("/a")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["one.txt", "sub"]);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let fs = MemoryFs::new().with_dir("/out");
        let mut writer = fs.open_write("/out/x.bin").await.unwrap();
        writer.write_all(b"payload").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut reader = fs.open_read("/out/x.bin").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"payload");
    }

    #[tokio::test]
    async fn test_rmdir_refuses_non_empty() {
        let fs = MemoryFs::new().with_file("/d/f", "x");
        assert!(fs.rmdir("/d").await.is_err());
        fs.unlink("/d/f").await.unwrap();
        fs.rmdir("/d").await.unwrap();
        assert!(!fs.contains("/d"));
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let fs = MemoryFs::new().with_file("/src/a/b.txt", "b");
        fs.rename("/src", "/dst").await.unwrap();
        assert_eq!(fs.file_contents("/dst/a/b.txt"), Some(b"b".to_vec()));
        assert!(!fs.contains("/src"));
    }

    #[tokio::test]
    async fn test_scripted_failure_is_logged() {
        let fs = MemoryFs::new().with_dir("/x");
        fs.fail_on(FsOp::Stat("/x".into()), "boom");
        let err = fs.stat("/x").await.unwrap_err();
        assert!(matches!(err, SftpError::ProtocolError(m) if m == "boom"));
        assert_eq!(fs.ops(), vec![FsOp::Stat("/x".into())]);
    }
}
