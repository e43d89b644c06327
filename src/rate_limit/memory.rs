use super::lua_scripts::{bucket_ttl_secs, TOKEN_BUCKET_SCRIPT};
use super::store::{ScriptReply, ScriptStore};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process shared store
///
/// Understands [`TOKEN_BUCKET_SCRIPT`] and runs its update under a single
/// lock, so it is atomic for every limiter holding the same `Arc`. Keys expire
/// like Redis keys. Availability can be switched off to simulate an outage.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    available: AtomicBool,
    evals: AtomicU64,
    pings: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            evals: AtomicU64::new(0),
            pings: AtomicU64::new(0),
        }
    }

    /// Make the store reachable or unreachable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of script executions attempted, including failed ones
    pub fn eval_count(&self) -> u64 {
        self.evals.load(Ordering::SeqCst)
    }

    /// Number of pings received, including failed ones
    pub fn ping_count(&self) -> u64 {
        self.pings.load(Ordering::SeqCst)
    }

    /// Store a raw value with an expiry
    pub fn set(&self, key: &str, value: impl ToString, ttl: Duration) {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Read a raw value, ignoring expired entries
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock();
        live_value(&entries, key).map(str::to_string)
    }

    /// Remaining tokens recorded under `key`, if any
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn run_token_bucket(&self, keys: &[String], args: &[String]) -> Result<ScriptReply, StoreError> {
        let (token_key, ts_key) = match keys {
            [tokens, timestamp] => (tokens, timestamp),
            _ => {
                return Err(StoreError::MalformedArgument(format!(
                    "expected 2 keys, got {}",
                    keys.len()
                )))
            }
        };
        let [rate, capacity, now, requested] = match args {
            [a, b, c, d] => [
                parse_arg("rate", a)?,
                parse_arg("capacity", b)?,
                parse_arg("now", c)?,
                parse_arg("requested", d)?,
            ],
            _ => {
                return Err(StoreError::MalformedArgument(format!(
                    "expected 4 arguments, got {}",
                    args.len()
                )))
            }
        };
        if rate <= 0.0 {
            return Err(StoreError::MalformedArgument("rate must be > 0".to_string()));
        }

        let ttl = Duration::from_secs(bucket_ttl_secs(rate as u32, capacity as u32));

        let mut entries = self.entries.lock();

        let tokens = live_value(&entries, token_key)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(capacity);
        let last_refill = live_value(&entries, ts_key)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);

        let elapsed = (now - last_refill).max(0.0);
        let mut available = capacity.min(tokens + elapsed * rate);
        let allowed = available >= requested;
        if allowed {
            available -= requested;
        }

        let expires_at = Instant::now() + ttl;
        entries.insert(
            token_key.clone(),
            Entry {
                value: available.to_string(),
                expires_at,
            },
        );
        entries.insert(
            ts_key.clone(),
            Entry {
                value: (now as u64).to_string(),
                expires_at,
            },
        );

        Ok(if allowed {
            ScriptReply::Integer(1)
        } else {
            ScriptReply::Nil
        })
    }
}

fn live_value<'a>(entries: &'a HashMap<String, Entry>, key: &str) -> Option<&'a str> {
    entries
        .get(key)
        .filter(|e| e.expires_at > Instant::now())
        .map(|e| e.value.as_str())
}

fn parse_arg(name: &str, raw: &str) -> Result<f64, StoreError> {
    raw.parse::<f64>()
        .map_err(|_| StoreError::MalformedArgument(format!("{} = {:?}", name, raw)))
}

#[async_trait]
impl ScriptStore for MemoryStore {
    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<ScriptReply, StoreError> {
        self.evals.fetch_add(1, Ordering::SeqCst);

        if !self.is_available() {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        if script != TOKEN_BUCKET_SCRIPT {
            return Err(StoreError::UnsupportedScript);
        }

        let reply = self.run_token_bucket(keys, args)?;
        debug!(keys = ?keys, reply = ?reply, "Memory store evaluated bucket script");
        Ok(reply)
    }

    async fn ping(&self) -> bool {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.is_available()
    }
}
