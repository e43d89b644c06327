use super::store::ScriptStore;
use super::types::Liveness;
use crate::metrics;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default pause between liveness probes
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(100);

/// Tracks whether the shared store is usable and heals the limiter once it
/// comes back.
///
/// The liveness flag is read lock-free on every decision. Flipping it, and
/// owning the single probe task, happens under `monitor_started`.
pub struct LivenessMonitor {
    /// Limiter identity, for logs and metrics
    identity: String,
    store: Arc<dyn ScriptStore>,
    heartbeat: Duration,
    alive: AtomicBool,
    /// True while a probe task is running
    monitor_started: Mutex<bool>,
    monitors_spawned: AtomicU64,
}

impl std::fmt::Debug for LivenessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessMonitor")
            .field("identity", &self.identity)
            .field("heartbeat", &self.heartbeat)
            .field("alive", &self.is_alive())
            .field("monitor_active", &self.is_active())
            .finish()
    }
}

impl LivenessMonitor {
    pub fn new(identity: String, store: Arc<dyn ScriptStore>, heartbeat: Duration) -> Self {
        metrics::record_remote_alive(&identity, true);
        Self {
            identity,
            store,
            heartbeat,
            alive: AtomicBool::new(true),
            monitor_started: Mutex::new(false),
            monitors_spawned: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn liveness(&self) -> Liveness {
        if self.is_alive() {
            Liveness::Live
        } else {
            Liveness::Degraded
        }
    }

    /// Whether a probe task is currently running
    pub fn is_active(&self) -> bool {
        *self.monitor_started.lock()
    }

    /// Probe tasks started over the monitor's lifetime
    pub fn monitors_spawned(&self) -> u64 {
        self.monitors_spawned.load(Ordering::SeqCst)
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Switch to the local bucket and make sure exactly one probe task runs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn degrade(self: &Arc<Self>) {
        let mut started = self.monitor_started.lock();
        self.alive.store(false, Ordering::Release);

        if *started {
            return;
        }
        *started = true;
        self.monitors_spawned.fetch_add(1, Ordering::SeqCst);
        drop(started);

        warn!(
            key = %self.identity,
            heartbeat_ms = self.heartbeat.as_millis() as u64,
            "Shared store unreachable, degrading to in-process bucket"
        );
        metrics::record_degrade(&self.identity);
        metrics::record_remote_alive(&self.identity, false);

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            monitor.probe_until_alive().await;
        });
    }

    async fn probe_until_alive(&self) {
        let mut ticker = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(key = %self.identity, "Started liveness monitor");

        let mut failures: u64 = 0;
        loop {
            ticker.tick().await;

            if self.store.ping().await {
                self.recover(failures);
                return;
            }

            failures += 1;
            metrics::record_probe_failure(&self.identity);
            debug!(key = %self.identity, failures, "Liveness probe failed");
        }
    }

    /// Back to the shared store. The flag and ownership change together so a
    /// failure racing with recovery always finds either a running monitor or
    /// a free slot to start one.
    fn recover(&self, failed_probes: u64) {
        let mut started = self.monitor_started.lock();
        self.alive.store(true, Ordering::Release);
        *started = false;
        drop(started);

        info!(
            key = %self.identity,
            failed_probes,
            "Shared store reachable again, resuming distributed limiting"
        );
        metrics::record_recover(&self.identity);
        metrics::record_remote_alive(&self.identity, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::memory::MemoryStore;

    fn monitor_with(store: Arc<MemoryStore>) -> Arc<LivenessMonitor> {
        Arc::new(LivenessMonitor::new(
            "monitor-test".to_string(),
            store,
            DEFAULT_HEARTBEAT,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_degrade_spawns_one_monitor() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let monitor = monitor_with(store.clone());

        for _ in 0..10 {
            monitor.degrade();
        }

        assert_eq!(monitor.liveness(), Liveness::Degraded);
        assert!(monitor.is_active());
        assert_eq!(monitor.monitors_spawned(), 1);

        // One probe loop means one ping per heartbeat
        tokio::time::sleep(DEFAULT_HEARTBEAT * 5 + Duration::from_millis(10)).await;
        assert_eq!(store.ping_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_recovers_and_exits() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let monitor = monitor_with(store.clone());

        monitor.degrade();
        tokio::time::sleep(DEFAULT_HEARTBEAT * 3 + Duration::from_millis(10)).await;
        assert!(!monitor.is_alive());

        store.set_available(true);
        tokio::time::sleep(DEFAULT_HEARTBEAT).await;

        assert!(monitor.is_alive());
        assert!(!monitor.is_active());

        // The probe loop is gone
        let pings = store.ping_count();
        tokio::time::sleep(DEFAULT_HEARTBEAT * 5).await;
        assert_eq!(store.ping_count(), pings);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_failure_after_recovery_starts_fresh_monitor() {
        let store = Arc::new(MemoryStore::new());
        let monitor = monitor_with(store.clone());

        monitor.degrade();
        tokio::time::sleep(DEFAULT_HEARTBEAT + Duration::from_millis(10)).await;
        assert!(monitor.is_alive());
        assert_eq!(monitor.monitors_spawned(), 1);

        store.set_available(false);
        monitor.degrade();
        assert!(monitor.is_active());
        assert_eq!(monitor.monitors_spawned(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_probe_before_first_heartbeat() {
        let store = Arc::new(MemoryStore::new());
        let monitor = monitor_with(store.clone());

        monitor.degrade();
        tokio::time::sleep(DEFAULT_HEARTBEAT / 2).await;
        assert_eq!(store.ping_count(), 0);
        assert!(!monitor.is_alive());
    }
}
