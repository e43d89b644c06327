use anyhow::Context;
use std::env;
use std::process;
use tokenlimit::config::TokenLimitConfig;
use tokenlimit::metrics::MetricsService;
use tokenlimit::rate_limit::TokenLimiter;
use tokenlimit::{init_limiter, init_tracing};
use tokio::signal;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/tokenlimit.yaml".to_string());

    // Load configuration
    let config = match TokenLimitConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("Usage: tokenlimit [config_file]");
            process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("tokenlimit error: {:#}", e);
        process::exit(1);
    }
}

async fn run(config: TokenLimitConfig) -> anyhow::Result<()> {
    init_tracing(&config.telemetry)?;

    let metrics = if config.telemetry.metrics {
        Some(MetricsService::new()?)
    } else {
        None
    };

    let limiter = init_limiter(&config).context("failed to build limiter")?;

    info!(
        key = %limiter.identity(),
        rate = limiter.rate(),
        capacity = limiter.capacity(),
        heartbeat = ?limiter.heartbeat(),
        iterations = config.driver.iterations,
        "Driving limiter"
    );

    let mut summary = Summary::default();
    tokio::select! {
        _ = drive(&limiter, config.driver.iterations, config.driver.interval(), &mut summary) => {}
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping early");
        }
    }

    println!(
        "allowed: {}, denied: {}, liveness: {}",
        summary.allowed,
        summary.denied,
        limiter.liveness()
    );

    if let Some(metrics) = metrics {
        println!("{}", metrics.render());
    }

    Ok(())
}

#[derive(Debug, Default)]
struct Summary {
    allowed: u64,
    denied: u64,
}

/// Check the limiter `iterations` times, counting into `summary` as it goes
async fn drive(
    limiter: &TokenLimiter,
    iterations: u64,
    interval: std::time::Duration,
    summary: &mut Summary,
) {
    for i in 0..iterations {
        tokio::time::sleep(interval).await;

        let allowed = limiter.allow().await;
        if allowed {
            summary.allowed += 1;
        } else {
            summary.denied += 1;
        }
        debug!(iteration = i, allowed, liveness = %limiter.liveness(), "Checked limiter");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokenlimit::config::LimiterConfig;
    use tokenlimit::rate_limit::MemoryStore;

    fn limiter(rate: u32, capacity: u32) -> TokenLimiter {
        TokenLimiter::new(
            LimiterConfig::new("driver", rate, capacity),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_counts_every_check() {
        let limiter = limiter(1, 3);
        let mut summary = Summary::default();

        drive(&limiter, 5, Duration::from_millis(10), &mut summary).await;

        // allow() reads the wall clock, which may tick over once mid-run
        assert_eq!(summary.allowed + summary.denied, 5);
        assert!(summary.allowed >= 3);
        assert!(summary.denied >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_drive_keeps_counts() {
        let limiter = limiter(1, 100);
        let mut summary = Summary::default();

        tokio::select! {
            _ = drive(&limiter, 1_000, Duration::from_millis(10), &mut summary) => {
                panic!("drive should have been interrupted");
            }
            _ = tokio::time::sleep(Duration::from_millis(55)) => {}
        }

        assert_eq!(summary.allowed, 5);
        assert_eq!(summary.denied, 0);
    }
}
