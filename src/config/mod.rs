use crate::error::{Result, TokenLimitError};
use crate::rate_limit::monitor::DEFAULT_HEARTBEAT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main tokenlimit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLimitConfig {
    /// Limiter definition
    pub limiter: LimiterConfig,
    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging and metrics
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Load driver settings for the binary
    #[serde(default)]
    pub driver: DriverConfig,
}

/// One rate-limited resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Identity shared by every process enforcing this limit
    pub key: String,
    /// Tokens generated per second
    pub rate: u32,
    /// Maximum tokens stored (burst size)
    pub capacity: u32,
    /// Interval between liveness probes while degraded, in milliseconds
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

/// Shared store backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Shared store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Upper bound for a single store call, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Install the Prometheus recorder
    #[serde(default)]
    pub metrics: bool,
}

/// How the binary exercises the limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Number of checks to run
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Pause between checks, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_heartbeat_ms() -> u64 {
    DEFAULT_HEARTBEAT.as_millis() as u64
}

fn default_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_store_timeout_ms() -> u64 {
    500
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

fn default_iterations() -> u64 {
    100
}

fn default_interval_ms() -> u64 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_redis_url(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            metrics: false,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl LimiterConfig {
    /// Limiter with the default heartbeat
    pub fn new(key: impl Into<String>, rate: u32, capacity: u32) -> Self {
        Self {
            key: key.into(),
            rate,
            capacity,
            heartbeat_ms: default_heartbeat_ms(),
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Validate limits
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(TokenLimitError::InvalidLimit(
                "Limiter key cannot be empty".to_string(),
            ));
        }
        if self.rate == 0 {
            return Err(TokenLimitError::InvalidLimit(format!(
                "Rate must be > 0 for limiter: {}",
                self.key
            )));
        }
        if self.capacity == 0 {
            return Err(TokenLimitError::InvalidLimit(format!(
                "Capacity must be > 0 for limiter: {}",
                self.key
            )));
        }
        if self.heartbeat_ms == 0 {
            return Err(TokenLimitError::InvalidLimit(format!(
                "Heartbeat must be > 0 for limiter: {}",
                self.key
            )));
        }
        Ok(())
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DriverConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl TokenLimitConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TokenLimitError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TokenLimitError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()?;

        if self.store.backend == StoreBackend::Redis
            && !self.store.url.starts_with("redis://")
            && !self.store.url.starts_with("rediss://")
            && !self.store.url.starts_with("redis+unix://")
        {
            return Err(TokenLimitError::Config(format!(
                "Store URL must start with redis://, rediss:// or redis+unix://: {}",
                self.store.url
            )));
        }

        if self.store.timeout_ms == 0 {
            return Err(TokenLimitError::Config(
                "Store timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
limiter:
  key: "payments-api"
  rate: 5
  capacity: 10
  heartbeat_ms: 250

store:
  backend: redis
  url: "redis://10.0.0.5:6379"
  timeout_ms: 200

telemetry:
  log_format: json
  metrics: true
"#;

        let config = TokenLimitConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.key, "payments-api");
        assert_eq!(config.limiter.rate, 5);
        assert_eq!(config.limiter.capacity, 10);
        assert_eq!(config.limiter.heartbeat(), Duration::from_millis(250));
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.timeout(), Duration::from_millis(200));
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert!(config.telemetry.metrics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let yaml = r#"
limiter:
  key: "search"
  rate: 100
  capacity: 100
"#;

        let config = TokenLimitConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.heartbeat_ms, 100);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.url, "redis://127.0.0.1:6379");
        assert_eq!(config.store.timeout_ms, 500);
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
        assert!(!config.telemetry.metrics);
        assert_eq!(config.driver.iterations, 100);
        assert_eq!(config.driver.interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_missing_limiter_is_an_error() {
        let result = TokenLimitConfig::from_yaml("store: {}\n");
        assert!(matches!(result, Err(TokenLimitError::Config(_))));
    }

    #[test]
    fn test_validate_zero_rate() {
        let config = TokenLimitConfig::from_yaml(
            "limiter:\n  key: \"search\"\n  rate: 0\n  capacity: 10\n",
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(TokenLimitError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_validate_invalid_redis_url() {
        let mut config = TokenLimitConfig::from_yaml(
            "limiter:\n  key: \"search\"\n  rate: 1\n  capacity: 1\n",
        )
        .unwrap();
        config.store.url = "http://localhost:6379".to_string();
        assert!(config.validate().is_err());

        // The URL is irrelevant for the in-process store
        config.store.backend = StoreBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "limiter:\n  key: \"file\"\n  rate: 2\n  capacity: 4\nstore:\n  backend: memory\n"
        )
        .unwrap();

        let config = TokenLimitConfig::from_file(file.path()).unwrap();
        assert_eq!(config.limiter.key, "file");
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_from_missing_file() {
        let result = TokenLimitConfig::from_file("/nonexistent/tokenlimit.yaml");
        assert!(matches!(result, Err(TokenLimitError::Config(_))));
    }
}
