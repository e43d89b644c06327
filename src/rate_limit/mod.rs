//! Rate limiting module
//!
//! A token bucket shared by every process that uses the same limiter key,
//! with an in-process bucket that takes over while the shared store is down.
//!
//! - **Remote path**: a Lua script updates the bucket atomically in Redis
//! - **Local path**: a continuous-refill bucket private to this process
//! - **Liveness monitor**: probes the store after a failure and switches the
//!   limiter back once it answers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokenlimit::config::LimiterConfig;
//! use tokenlimit::rate_limit::{MemoryStore, TokenLimiter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LimiterConfig::new("payments-api", 5, 10);
//!
//!     // In-process store, handy for tests and single-node setups
//!     let limiter = TokenLimiter::new(config, Arc::new(MemoryStore::new())).unwrap();
//!
//!     // Or Redis-backed
//!     // let limiter = TokenLimiter::with_redis(config, &StoreConfig::default()).unwrap();
//!
//!     if limiter.allow().await {
//!         // call the downstream API
//!     }
//! }
//! ```

pub mod limiter;
pub mod local;
pub mod lua_scripts;
pub mod memory;
pub mod monitor;
pub mod redis;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use limiter::TokenLimiter;
pub use local::LocalTokenBucket;
pub use memory::MemoryStore;
pub use monitor::{LivenessMonitor, DEFAULT_HEARTBEAT};
pub use self::redis::RedisStore;
pub use store::{ScriptReply, ScriptStore};
pub use types::{BucketKeys, DecisionPath, Liveness};
