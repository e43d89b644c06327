pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod rate_limit;

use crate::config::{StoreBackend, TokenLimitConfig};
use crate::error::Result;
use crate::rate_limit::{MemoryStore, RedisStore, ScriptStore, TokenLimiter};
use std::sync::Arc;
use tracing::info;

pub use crate::observability::init_tracing;

/// Build the store and limiter described by `config`.
///
/// Never connects to the store, so this succeeds while Redis is down.
pub fn init_limiter(config: &TokenLimitConfig) -> Result<TokenLimiter> {
    config.validate()?;

    let store: Arc<dyn ScriptStore> = match config.store.backend {
        StoreBackend::Redis => {
            info!(url = %config.store.url, "Using Redis store");
            Arc::new(RedisStore::new(&config.store.url, config.store.timeout())?)
        }
        StoreBackend::Memory => {
            info!("Using in-process store");
            Arc::new(MemoryStore::new())
        }
    };

    TokenLimiter::new(config.limiter.clone(), store)
}
