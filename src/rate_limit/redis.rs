use super::store::{ScriptReply, ScriptStore};
use crate::error::StoreError;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, Script, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, info};

/// Redis-backed shared store
///
/// The connection is opened on first use, so a store can be built while the
/// server is down; until it comes up every call fails and the limiter stays
/// degraded. Once opened, the [`ConnectionManager`] reconnects on its own.
/// Every round trip is bounded by `timeout`.
pub struct RedisStore {
    url: String,
    /// Redis client used to open the connection
    client: Client,
    /// Redis connection manager, set by the first successful connect
    connection: OnceCell<ConnectionManager>,
    /// Upper bound for a single connect, script call or ping
    timeout: Duration,
}

impl RedisStore {
    /// Create a store for `redis_url` without connecting.
    ///
    /// Fails only if the URL cannot be parsed.
    pub fn new(redis_url: &str, timeout_after: Duration) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;

        Ok(Self {
            url: redis_url.to_string(),
            client,
            connection: OnceCell::new(),
            timeout: timeout_after,
        })
    }

    /// Whether a connection has been opened
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let manager = timeout(self.timeout, ConnectionManager::new(self.client.clone()))
                    .await
                    .map_err(|_| StoreError::Timeout(self.timeout))??;
                info!(url = %self.url, "Connected to Redis");
                Ok::<_, StoreError>(manager)
            })
            .await?;

        Ok(connection.clone())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ScriptStore for RedisStore {
    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<ScriptReply, StoreError> {
        let script = Script::new(script);
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }

        let mut connection = self.connection().await?;
        let value = timeout(
            self.timeout,
            invocation.invoke_async::<_, Value>(&mut connection),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.timeout))??;

        Ok(match value {
            Value::Nil => ScriptReply::Nil,
            Value::Int(code) => ScriptReply::Integer(code),
            other => ScriptReply::Other(format!("{:?}", other)),
        })
    }

    async fn ping(&self) -> bool {
        let mut connection = match self.connection().await {
            Ok(connection) => connection,
            Err(e) => {
                debug!(error = %e, "Redis connect failed");
                return false;
            }
        };
        match timeout(
            self.timeout,
            redis::cmd("PING").query_async::<_, String>(&mut connection),
        )
        .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "Redis ping failed");
                false
            }
            Err(_) => {
                debug!(timeout = ?self.timeout, "Redis ping timed out");
                false
            }
        }
    }
}
