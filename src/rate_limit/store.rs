//! The interface the limiter needs from its shared store.

use crate::error::StoreError;
use async_trait::async_trait;

/// Reply to a script execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    /// The script returned nil (a Lua `false` also comes back as nil)
    Nil,
    /// The script returned an integer
    Integer(i64),
    /// Anything else, kept in readable form for diagnostics
    Other(String),
}

/// A key-value store able to run atomic scripts.
///
/// Implementations must execute `eval` as one indivisible operation: no other
/// caller may read or write the script's keys while it runs.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Execute `script` with the given keys and string arguments
    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<ScriptReply, StoreError>;

    /// Lightweight reachability check with no effect on bucket state
    async fn ping(&self) -> bool;
}
