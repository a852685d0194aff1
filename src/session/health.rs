//! Connection Health Monitor
//!
//! Periodically checks whether the session is still up and, if not, asks the
//! manager to connect again with the last configuration. Reconnects go through
//! [`SftpManager::connect`], so retry bookkeeping stays in one place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::manager::SftpManager;

/// Health monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthMonitorConfig {
    /// Time between checks (ms)
    pub interval_ms: u64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30000, // 30 seconds
        }
    }
}

impl HealthMonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Result of a single health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheck {
    /// Session is up, nothing to do
    Connected,
    /// Session is down and was never configured
    NoConfig,
    /// Session was down and the reconnect succeeded
    Reconnected,
    /// Session was down and the reconnect failed
    ReconnectFailed(String),
}

/// Run one check against `manager`
pub async fn check_once(manager: &Arc<SftpManager>) -> HealthCheck {
    if manager.is_connected() {
        debug!("Health check: connected");
        return HealthCheck::Connected;
    }

    let Some(config) = manager.last_config() else {
        debug!("Health check: disconnected and no configuration to reconnect with");
        return HealthCheck::NoConfig;
    };

    info!("Health check: disconnected, reconnecting to {}", config.address());
    match manager.connect(config).await {
        Ok(()) => {
            info!("Health check: reconnected");
            HealthCheck::Reconnected
        }
        Err(e) => {
            warn!("Health check: reconnect failed: {}", e);
            HealthCheck::ReconnectFailed(e.to_string())
        }
    }
}

/// Periodic connection watchdog
///
/// `start` is idempotent; a stopped monitor can be started again.
pub struct HealthMonitor {
    config: HealthMonitorConfig,
    active: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self {
            config,
            active: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Start checking `manager` every interval. Returns false if already running.
    pub fn start(&self, manager: Arc<SftpManager>) -> bool {
        let mut task = self.task.lock();
        if self.active.swap(true, Ordering::SeqCst) {
            debug!("Health monitor already active");
            return false;
        }

        let period = self.config.interval();
        info!("Health monitor started (interval={}ms)", period.as_millis());

        *task = Some(tokio::spawn(async move {
            // First check one full period after start
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                check_once(&manager).await;
            }
        }));
        true
    }

    /// Stop the timer. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let mut task = self.task.lock();
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(handle) = task.take() {
            handle.abort();
        }
        info!("Health monitor stopped");
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
