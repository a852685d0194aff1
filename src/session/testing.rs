//! Scripted transport for session tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::listener::ConnectionListener;
use crate::sftp::{MemoryFs, RemoteFs};
use crate::ssh::{Connection, PingResult, SftpConfig, SshError, Transport};

pub fn test_config() -> SftpConfig {
    SftpConfig::new("h", 22, "u", "p").with_ready_timeout(30000)
}

pub struct MockConnection {
    fs: MemoryFs,
    closed_tx: watch::Sender<bool>,
    pub closes: AtomicUsize,
}

impl MockConnection {
    /// Simulate the peer going away
    pub fn drop_link(&self) {
        self.closed_tx.send_replace(true);
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn fs(&self) -> Arc<dyn RemoteFs> {
        Arc::new(self.fs.clone())
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    async fn ping(&self) -> PingResult {
        if *self.closed_tx.borrow() {
            PingResult::IoError
        } else {
            PingResult::Ok
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed_tx.send_replace(true);
    }
}

#[derive(Default)]
pub struct MockTransport {
    pub fs: MemoryFs,
    opens: AtomicUsize,
    /// Consumed one per attempt before `always_fail` is consulted
    failures: Mutex<VecDeque<SshError>>,
    always_fail: Mutex<Option<SshError>>,
    delay: Duration,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fs(fs: MemoryFs) -> Self {
        Self {
            fs,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_next(&self, err: SshError) {
        self.failures.lock().push_back(err);
    }

    pub fn fail_always(&self, err: Option<SshError>) {
        *self.always_fail.lock() = err;
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.connections.lock()[index].clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _config: &SftpConfig) -> Result<Arc<dyn Connection>, SshError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.failures.lock().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        let always = self.always_fail.lock().clone();
        if let Some(err) = always {
            return Err(err);
        }

        let (closed_tx, _) = watch::channel(false);
        let connection = Arc::new(MockConnection {
            fs: self.fs.clone(),
            closed_tx,
            closes: AtomicUsize::new(0),
        });
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

/// Listener that records every notification
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<(bool, Option<SshError>)>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<(bool, Option<SshError>)> {
        self.events.lock().clone()
    }
}

impl ConnectionListener for Recorder {
    fn on_connection_change(&self, connected: bool, error: Option<&SshError>) {
        self.events.lock().push((connected, error.cloned()));
    }
}

/// Let spawned tasks run without reaching any reconnect backoff
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
