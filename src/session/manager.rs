//! SFTP Session Manager
//!
//! Owns the single SFTP session of the process: connect / disconnect, loss
//! detection, bounded automatic reconnection and the filesystem operations
//! layered on top.
//!
//! # State machine
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │
//!      │                      error         unexpected close
//!      │                        ▼                  ▼
//!      └──── give up ──── ReconnectScheduled ◀─────┘
//! ```
//!
//! Every transition that invalidates pending work bumps `generation`. A
//! scheduled reconnect or a close watcher captures the generation when it is
//! created and becomes a no-op once it no longer matches.
//!
//! # Locking
//!
//! `inner` is a `parking_lot` mutex and is never held across `.await`.
//! Listeners are always notified after the lock is released.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::listener::{ConnectionListener, ListenerRemover, ListenerSet};
use super::reconnect::ReconnectConfig;
use super::types::{SessionState, StatusInfo};
use crate::sftp::path_utils::normalize_remote_path;
use crate::sftp::{ops, FileEntry, RemoteFs, SftpError};
use crate::ssh::{Connection, PingResult, SftpConfig, SshError, Transport};

/// Outcome of the in-flight connect attempt, shared by every caller waiting on it
type ConnectOutcome = Shared<BoxFuture<'static, Result<(), SshError>>>;

/// Transport plus the SFTP handle derived from it.
/// Both exist together or not at all.
struct Live {
    connection: Arc<dyn Connection>,
    fs: Arc<dyn RemoteFs>,
}

enum Phase {
    Disconnected,
    Connecting,
    Connected(Live),
    ReconnectScheduled { attempt: u32 },
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Disconnected => SessionState::Disconnected,
            Phase::Connecting => SessionState::Connecting,
            Phase::Connected(_) => SessionState::Connected,
            Phase::ReconnectScheduled { attempt } => SessionState::ReconnectScheduled {
                attempt: *attempt,
            },
        }
    }
}

struct InFlight {
    id: u64,
    outcome: ConnectOutcome,
}

struct Inner {
    phase: Phase,
    last_config: Option<SftpConfig>,
    in_flight: Option<InFlight>,
    reconnect_task: Option<JoinHandle<()>>,
    close_watcher: Option<JoinHandle<()>>,
}

/// Manager for the process-wide SFTP session
///
/// Construct one in the composition root and share it as `Arc<SftpManager>`.
pub struct SftpManager {
    transport: Arc<dyn Transport>,
    reconnect: ReconnectConfig,
    inner: Mutex<Inner>,
    listeners: Arc<ListenerSet>,
    generation: AtomicU64,
    next_attempt_id: AtomicU64,
    auto_reconnect: AtomicBool,
    reconnect_attempts: AtomicU32,
}

impl SftpManager {
    pub fn new(transport: Arc<dyn Transport>, reconnect: ReconnectConfig) -> Self {
        Self {
            transport,
            auto_reconnect: AtomicBool::new(reconnect.enabled),
            reconnect,
            inner: Mutex::new(Inner {
                phase: Phase::Disconnected,
                last_config: None,
                in_flight: None,
                reconnect_task: None,
                close_watcher: None,
            }),
            listeners: Arc::new(ListenerSet::new()),
            generation: AtomicU64::new(0),
            next_attempt_id: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Connect with `config`.
    ///
    /// If an attempt is already in flight this waits for it and returns its
    /// outcome; `config` is ignored in that case. A live connection is replaced.
    pub async fn connect(self: &Arc<Self>, config: SftpConfig) -> Result<(), SshError> {
        let outcome = {
            let mut inner = self.inner.lock();
            let in_flight = inner
                .in_flight
                .as_ref()
                .map(|f| (f.id, f.outcome.clone()));
            match in_flight {
                Some((id, outcome)) => {
                    debug!("Connect already in flight (attempt {}), joining it", id);
                    outcome
                }
                None => self.begin_attempt(&mut inner, config),
            }
        };
        outcome.await
    }

    fn begin_attempt(self: &Arc<Self>, inner: &mut Inner, config: SftpConfig) -> ConnectOutcome {
        let id = self.next_attempt_id.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(task) = inner.reconnect_task.take() {
            debug!("Connect attempt {} supersedes the scheduled reconnect", id);
            task.abort();
        }
        if let Phase::Connected(old) = std::mem::replace(&mut inner.phase, Phase::Connecting) {
            info!("Replacing live SFTP connection (attempt {})", id);
            self.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(watcher) = inner.close_watcher.take() {
                watcher.abort();
            }
            tokio::spawn(async move { old.connection.close().await });
        }

        inner.last_config = Some(config.clone());
        let generation = self.generation.load(Ordering::SeqCst);

        // Spawned so the attempt completes even if every caller goes away
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move { manager.run_attempt(id, generation, config).await });
        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                Err(SshError::ConnectionFailed(format!("Connect task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        inner.in_flight = Some(InFlight {
            id,
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn run_attempt(
        self: Arc<Self>,
        id: u64,
        generation: u64,
        config: SftpConfig,
    ) -> Result<(), SshError> {
        info!("Connecting SFTP session to {} (attempt {})", config.address(), id);

        match self.transport.open(&config).await {
            Ok(connection) => self.finish_success(id, generation, connection, &config).await,
            Err(e) => {
                self.finish_failure(id, generation, &e);
                Err(e)
            }
        }
    }

    async fn finish_success(
        self: &Arc<Self>,
        id: u64,
        generation: u64,
        connection: Arc<dyn Connection>,
        config: &SftpConfig,
    ) -> Result<(), SshError> {
        let live_generation = {
            let mut inner = self.inner.lock();
            clear_in_flight(&mut inner, id);

            if self.generation.load(Ordering::SeqCst) != generation {
                None
            } else {
                let live_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                inner.phase = Phase::Connected(Live {
                    fs: connection.fs(),
                    connection: connection.clone(),
                });
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                Some(live_generation)
            }
        };

        let Some(live_generation) = live_generation else {
            info!(
                "Session was disconnected while connecting to {}, dropping the new connection",
                config.address()
            );
            connection.close().await;
            return Err(SshError::Disconnected);
        };

        info!("SFTP session connected to {}", config.address());
        self.listeners.notify(true, None);

        // Watcher starts after the notification so a link that is already
        // gone is reported as (false) after (true), never before it.
        let watcher = self.spawn_close_watcher(connection.closed(), live_generation);
        let mut inner = self.inner.lock();
        if self.generation.load(Ordering::SeqCst) == live_generation {
            inner.close_watcher = Some(watcher);
        } else {
            watcher.abort();
        }
        Ok(())
    }

    fn finish_failure(self: &Arc<Self>, id: u64, generation: u64, err: &SshError) {
        {
            let mut inner = self.inner.lock();
            clear_in_flight(&mut inner, id);
            // Cancelled by disconnect; the phase may already belong to a newer attempt
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!("Connect attempt {} failed after being cancelled: {}", id, err);
                return;
            }
            if matches!(inner.phase, Phase::Connecting) {
                inner.phase = Phase::Disconnected;
            }
        }

        warn!("SFTP connect attempt {} failed: {}", id, err);
        self.listeners.notify(false, Some(err));
        self.schedule_reconnect();
    }

    fn spawn_close_watcher(
        self: &Arc<Self>,
        mut closed: watch::Receiver<bool>,
        generation: u64,
    ) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            // A dropped sender means the connection is gone as well
            let _ = closed.wait_for(|closed| *closed).await;
            if let Some(manager) = manager.upgrade() {
                manager.handle_unexpected_close(generation);
            }
        })
    }

    fn handle_unexpected_close(self: &Arc<Self>, generation: u64) {
        {
            let mut inner = self.inner.lock();
            if self.generation.load(Ordering::SeqCst) != generation
                || !matches!(inner.phase, Phase::Connected(_))
            {
                return;
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            inner.close_watcher = None;
            inner.phase = Phase::Disconnected;
        }

        warn!("SFTP transport closed unexpectedly");
        self.listeners.notify(false, None);
        self.schedule_reconnect();
    }

    /// Arm the backoff timer for the next automatic attempt, if allowed
    fn schedule_reconnect(self: &Arc<Self>) {
        let mut inner = self.inner.lock();

        if !self.auto_reconnect.load(Ordering::SeqCst) {
            debug!("Auto-reconnect disabled, not scheduling");
            return;
        }
        if !matches!(inner.phase, Phase::Disconnected) {
            debug!("Not scheduling reconnect while {}", inner.phase.state());
            return;
        }

        let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
        if !self.reconnect.has_remaining(attempts) {
            warn!(
                "Giving up after {} reconnect attempts, waiting for a manual connect",
                attempts
            );
            return;
        }

        let attempt = attempts + 1;
        self.reconnect_attempts.store(attempt, Ordering::SeqCst);
        inner.phase = Phase::ReconnectScheduled { attempt };

        let generation = self.generation.load(Ordering::SeqCst);
        let delay = self.reconnect.interval();
        info!(
            "Reconnect attempt {}/{} scheduled in {}ms",
            attempt,
            self.reconnect.max_attempts,
            delay.as_millis()
        );

        let manager = Arc::downgrade(self);
        inner.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = manager.upgrade() {
                manager.fire_reconnect(generation, attempt).await;
            }
        }));
    }

    async fn fire_reconnect(self: &Arc<Self>, generation: u64, attempt: u32) {
        let config = {
            let mut inner = self.inner.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!("Reconnect attempt {} is stale, skipping", attempt);
                return;
            }
            // Our own handle; the task is already running
            inner.reconnect_task = None;

            if !self.auto_reconnect.load(Ordering::SeqCst) {
                info!("Auto-reconnect was disabled, skipping attempt {}", attempt);
                inner.phase = Phase::Disconnected;
                return;
            }
            match inner.last_config.clone() {
                Some(config) => config,
                None => {
                    inner.phase = Phase::Disconnected;
                    return;
                }
            }
        };

        info!("Reconnect attempt {}/{}", attempt, self.reconnect.max_attempts);
        match self.connect(config).await {
            Ok(()) => info!("Reconnect attempt {} succeeded", attempt),
            Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
        }
    }

    /// Close the session on purpose.
    ///
    /// Auto-reconnect is switched off first and any scheduled reconnect is
    /// cancelled. An in-flight connect is detached: its callers get
    /// `Disconnected` and the next `connect` starts a fresh attempt.
    /// Listeners are told `(false)` only if a transport was open.
    pub async fn disconnect(&self) {
        self.auto_reconnect.store(false, Ordering::SeqCst);

        let live = {
            let mut inner = self.inner.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(attempt) = inner.in_flight.take() {
                debug!("Cancelling in-flight connect attempt {}", attempt.id);
            }
            if let Some(task) = inner.reconnect_task.take() {
                task.abort();
            }
            if let Some(watcher) = inner.close_watcher.take() {
                watcher.abort();
            }
            match std::mem::replace(&mut inner.phase, Phase::Disconnected) {
                Phase::Connected(live) => Some(live),
                _ => None,
            }
        };
        self.reconnect_attempts.store(0, Ordering::SeqCst);

        let Some(live) = live else {
            debug!("Disconnect requested with no open transport");
            return;
        };

        info!("Disconnecting SFTP session");
        live.connection.close().await;
        info!("SFTP session disconnected");
        self.listeners.notify(false, None);
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.inner.lock().phase, Phase::Connected(_))
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().phase.state()
    }

    pub fn status_info(&self) -> StatusInfo {
        let state = self.state();
        StatusInfo {
            connected: state.is_connected(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::SeqCst),
            max_reconnect_attempts: self.reconnect.max_attempts,
            auto_reconnect: self.auto_reconnect.load(Ordering::SeqCst),
            state,
        }
    }

    /// Keepalive round trip on the live transport
    pub async fn ping(&self) -> Result<PingResult, SftpError> {
        let connection = match &self.inner.lock().phase {
            Phase::Connected(live) => live.connection.clone(),
            _ => return Err(SftpError::NotConnected),
        };
        Ok(connection.ping().await)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Listeners
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_connection_listener(
        &self,
        listener: Arc<dyn ConnectionListener>,
    ) -> ListenerRemover {
        self.listeners.add(listener)
    }

    /// Register a closure as a listener
    pub fn on_connection_change<F>(&self, f: F) -> ListenerRemover
    where
        F: Fn(bool, Option<&SshError>) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(f))
    }

    pub fn remove_connection_listener(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        self.listeners.remove(listener)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Operational escape hatches
    // ═══════════════════════════════════════════════════════════════════════

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        info!("Auto-reconnect set to {}", enabled);
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    pub fn set_reconnect_attempts(&self, attempts: u32) {
        self.reconnect_attempts.store(attempts, Ordering::SeqCst);
    }

    pub fn reset_reconnect_attempts(&self) {
        self.set_reconnect_attempts(0);
    }

    /// Configuration of the most recent connect attempt
    pub fn last_config(&self) -> Option<SftpConfig> {
        self.inner.lock().last_config.clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Filesystem operations
    // ═══════════════════════════════════════════════════════════════════════

    fn fs(&self) -> Result<Arc<dyn RemoteFs>, SftpError> {
        match &self.inner.lock().phase {
            Phase::Connected(live) => Ok(live.fs.clone()),
            _ => Err(SftpError::NotConnected),
        }
    }

    /// Directory listing, directories first then by name
    pub async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        let fs = self.fs()?;
        ops::list_entries(fs.as_ref(), &normalize_remote_path(path)).await
    }

    pub async fn stat(&self, path: &str) -> Result<FileEntry, SftpError> {
        let fs = self.fs()?;
        ops::stat_entry(fs.as_ref(), &normalize_remote_path(path)).await
    }

    pub async fn create_directory(&self, path: &str) -> Result<(), SftpError> {
        let fs = self.fs()?;
        fs.mkdir(&normalize_remote_path(path)).await
    }

    /// Upload a local file, overwriting the remote one. Returns bytes sent.
    pub async fn upload_file(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
    ) -> Result<u64, SftpError> {
        let fs = self.fs()?;
        ops::upload(fs.as_ref(), local_path.as_ref(), &normalize_remote_path(remote_path)).await
    }

    /// Download a remote file to a local path. Returns bytes received.
    pub async fn download_file(
        &self,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<u64, SftpError> {
        let fs = self.fs()?;
        ops::download(fs.as_ref(), &normalize_remote_path(remote_path), local_path.as_ref()).await
    }

    /// Delete a file or a directory tree
    pub async fn delete_file(&self, path: &str) -> Result<(), SftpError> {
        let fs = self.fs()?;
        ops::delete_recursive(fs.as_ref(), &normalize_remote_path(path)).await?;
        Ok(())
    }

    pub async fn rename_file(&self, old_path: &str, new_path: &str) -> Result<(), SftpError> {
        let fs = self.fs()?;
        fs.rename(&normalize_remote_path(old_path), &normalize_remote_path(new_path))
            .await
    }

    /// Copy a file or a directory tree
    pub async fn copy(&self, source: &str, target: &str) -> Result<(), SftpError> {
        let fs = self.fs()?;
        ops::copy_recursive(
            fs.as_ref(),
            &normalize_remote_path(source),
            &normalize_remote_path(target),
        )
        .await?;
        Ok(())
    }

    /// Move = copy then delete the source
    pub async fn move_path(&self, source: &str, target: &str) -> Result<(), SftpError> {
        let fs = self.fs()?;
        ops::move_path(
            fs.as_ref(),
            &normalize_remote_path(source),
            &normalize_remote_path(target),
        )
        .await
    }

    /// Whether `path` can be stat'ed; any stat failure counts as absent
    pub async fn exists(&self, path: &str) -> Result<bool, SftpError> {
        let fs = self.fs()?;
        Ok(ops::exists(fs.as_ref(), &normalize_remote_path(path)).await)
    }
}

impl Drop for SftpManager {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(task) = inner.reconnect_task.take() {
            task.abort();
        }
        if let Some(watcher) = inner.close_watcher.take() {
            watcher.abort();
        }
    }
}

fn clear_in_flight(inner: &mut Inner, id: u64) {
    if inner.in_flight.as_ref().is_some_and(|f| f.id == id) {
        inner.in_flight = None;
    }
}
