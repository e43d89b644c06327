use super::local::LocalTokenBucket;
use super::lua_scripts::TOKEN_BUCKET_SCRIPT;
use super::monitor::LivenessMonitor;
use super::redis::RedisStore;
use super::store::{ScriptReply, ScriptStore};
use super::types::{BucketKeys, DecisionPath, Liveness};
use crate::config::{LimiterConfig, StoreConfig};
use crate::error::Result;
use crate::metrics;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Token bucket limiter coordinated through a shared store.
///
/// Every check runs the bucket script in the store while the store is
/// reachable. The first failed call degrades the limiter: that call and every
/// later one are answered by an in-process bucket until a background monitor
/// sees the store again.
///
/// Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct TokenLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    rate: u32,
    capacity: u32,
    identity: String,
    keys: BucketKeys,
    store: Arc<dyn ScriptStore>,
    local: LocalTokenBucket,
    monitor: Arc<LivenessMonitor>,
}

/// How a remote check ended
enum RemoteOutcome {
    Decided(bool),
    Failed { reason: String, connectivity: bool },
}

impl TokenLimiter {
    /// Create a limiter over an existing store
    pub fn new(config: LimiterConfig, store: Arc<dyn ScriptStore>) -> Result<Self> {
        config.validate()?;

        let keys = BucketKeys::for_identity(&config.key);
        let monitor = Arc::new(LivenessMonitor::new(
            config.key.clone(),
            store.clone(),
            config.heartbeat(),
        ));

        info!(
            key = %config.key,
            rate = config.rate,
            capacity = config.capacity,
            "Creating token limiter"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                rate: config.rate,
                capacity: config.capacity,
                identity: config.key,
                keys,
                store,
                local: LocalTokenBucket::new(config.rate, config.capacity),
                monitor,
            }),
        })
    }

    /// Create a limiter backed by Redis.
    ///
    /// Does not connect: a server that is down at startup degrades the first
    /// check like any later outage.
    pub fn with_redis(config: LimiterConfig, store_config: &StoreConfig) -> Result<Self> {
        let store = RedisStore::new(&store_config.url, store_config.timeout())?;
        Self::new(config, Arc::new(store))
    }

    /// Alias for `allow_n(SystemTime::now(), 1)`
    pub async fn allow(&self) -> bool {
        self.allow_n(SystemTime::now(), 1).await
    }

    /// Whether `n` tokens can be taken at `now`.
    ///
    /// Never fails: store errors degrade the limiter and the answer comes from
    /// the in-process bucket.
    pub async fn allow_n(&self, now: SystemTime, n: u32) -> bool {
        let inner = &self.inner;

        if !inner.monitor.is_alive() {
            return self.allow_local(now, n);
        }

        match self.eval_remote(now, n).await {
            RemoteOutcome::Decided(allowed) => {
                metrics::record_decision(&inner.identity, DecisionPath::Remote, allowed);
                debug!(key = %inner.identity, requested = n, allowed, "Remote decision");
                allowed
            }
            RemoteOutcome::Failed {
                reason,
                connectivity,
            } => {
                warn!(
                    key = %inner.identity,
                    reason = %reason,
                    connectivity,
                    "Failed to run bucket script, falling back to in-process bucket"
                );
                inner.monitor.degrade();
                self.allow_local(now, n)
            }
        }
    }

    async fn eval_remote(&self, now: SystemTime, n: u32) -> RemoteOutcome {
        let inner = &self.inner;
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let args = [
            inner.rate.to_string(),
            inner.capacity.to_string(),
            now_secs.to_string(),
            n.to_string(),
        ];

        match inner
            .store
            .eval(TOKEN_BUCKET_SCRIPT, &inner.keys.to_vec(), &args)
            .await
        {
            // The script's `false` comes back as nil
            Ok(ScriptReply::Nil) => RemoteOutcome::Decided(false),
            Ok(ScriptReply::Integer(code)) => RemoteOutcome::Decided(code == 1),
            Ok(ScriptReply::Other(value)) => RemoteOutcome::Failed {
                reason: format!("unexpected script reply: {}", value),
                connectivity: false,
            },
            Err(e) => RemoteOutcome::Failed {
                reason: e.to_string(),
                connectivity: e.is_connectivity(),
            },
        }
    }

    fn allow_local(&self, now: SystemTime, n: u32) -> bool {
        let inner = &self.inner;
        let allowed = inner.local.allow_n(now, n);
        metrics::record_decision(&inner.identity, DecisionPath::Local, allowed);
        debug!(key = %inner.identity, requested = n, allowed, "Local decision");
        allowed
    }

    pub fn liveness(&self) -> Liveness {
        self.inner.monitor.liveness()
    }

    pub fn is_remote_alive(&self) -> bool {
        self.inner.monitor.is_alive()
    }

    /// Whether a liveness monitor is probing the store right now
    pub fn monitor_active(&self) -> bool {
        self.inner.monitor.is_active()
    }

    /// Number of degrade episodes that started a monitor
    pub fn monitors_spawned(&self) -> u64 {
        self.inner.monitor.monitors_spawned()
    }

    pub fn heartbeat(&self) -> Duration {
        self.inner.monitor.heartbeat()
    }

    pub fn keys(&self) -> &BucketKeys {
        &self.inner.keys
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn rate(&self) -> u32 {
        self.inner.rate
    }

    pub fn capacity(&self) -> u32 {
        self.inner.capacity
    }

    /// Tokens left in the in-process fallback bucket
    pub fn local_tokens(&self) -> f64 {
        self.inner.local.tokens()
    }

    #[cfg(test)]
    fn degrade(&self) {
        self.inner.monitor.degrade();
    }
}

impl std::fmt::Debug for TokenLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLimiter")
            .field("identity", &self.inner.identity)
            .field("rate", &self.inner.rate)
            .field("capacity", &self.inner.capacity)
            .field("liveness", &self.liveness())
            .finish()
    }
}
