use serde::{Deserialize, Serialize};
use std::fmt;

/// Which decision path the limiter is currently using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// The shared store answers every check
    Live,
    /// The store failed; checks are answered by the in-process bucket
    Degraded,
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Liveness::Live => write!(f, "Live"),
            Liveness::Degraded => write!(f, "Degraded"),
        }
    }
}

/// Which bucket produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPath {
    Remote,
    Local,
}

impl DecisionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionPath::Remote => "remote",
            DecisionPath::Local => "local",
        }
    }
}

/// The pair of shared-store keys backing one limiter.
///
/// Both names carry the identity inside a `{...}` hash tag so that Redis
/// Cluster places them in the same slot, which the bucket script requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKeys {
    /// Remaining tokens
    pub tokens: String,
    /// Unix seconds of the last refill
    pub timestamp: String,
}

impl BucketKeys {
    /// Derive the keys for a limiter identity
    pub fn for_identity(identity: &str) -> Self {
        Self {
            tokens: format!("{{{}}}.tokenlimit", identity),
            timestamp: format!("{{{}}}.tokenlimit.ts", identity),
        }
    }

    /// Keys in the order the bucket script expects them
    pub fn to_vec(&self) -> Vec<String> {
        vec![self.tokens.clone(), self.timestamp.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_keys_share_hash_tag() {
        let keys = BucketKeys::for_identity("payments-api");
        assert_eq!(keys.tokens, "{payments-api}.tokenlimit");
        assert_eq!(keys.timestamp, "{payments-api}.tokenlimit.ts");
        assert_eq!(keys.to_vec(), vec![keys.tokens.clone(), keys.timestamp.clone()]);
    }

    #[test]
    fn test_bucket_keys_are_stable() {
        assert_eq!(
            BucketKeys::for_identity("search"),
            BucketKeys::for_identity("search")
        );
        assert_ne!(
            BucketKeys::for_identity("search"),
            BucketKeys::for_identity("checkout")
        );
    }

    #[test]
    fn test_liveness_display() {
        assert_eq!(Liveness::Live.to_string(), "Live");
        assert_eq!(Liveness::Degraded.to_string(), "Degraded");
    }
}
