use parking_lot::Mutex;
use std::time::SystemTime;
use tracing::debug;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Local (in-memory) token bucket
///
/// Tokens accrue continuously at `rate` per second up to `capacity`. The
/// bucket starts full. Callers pass the instant they are asking about, so a
/// decision never waits.
#[derive(Debug)]
pub struct LocalTokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    /// `None` until the first check
    last_refill: Option<SystemTime>,
}

impl BucketState {
    /// Refill up to `now`. An instant earlier than the last refill adds nothing.
    fn advance(&mut self, now: SystemTime, rate: f64, capacity: f64) {
        match self.last_refill {
            Some(last) => {
                if let Ok(elapsed) = now.duration_since(last) {
                    let refill = elapsed.as_nanos() as f64 * rate / NANOS_PER_SEC;
                    self.tokens = capacity.min(self.tokens + refill);
                    self.last_refill = Some(now);
                }
            }
            None => self.last_refill = Some(now),
        }
    }
}

impl LocalTokenBucket {
    /// Create a full bucket
    pub fn new(rate: u32, capacity: u32) -> Self {
        Self {
            rate: rate as f64,
            capacity: capacity as f64,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: None,
            }),
        }
    }

    /// Take `n` tokens at `now` if that many are available
    pub fn allow_n(&self, now: SystemTime, n: u32) -> bool {
        let mut state = self.state.lock();
        state.advance(now, self.rate, self.capacity);

        let requested = n as f64;
        if state.tokens >= requested {
            state.tokens -= requested;
            true
        } else {
            debug!(
                available = state.tokens,
                requested = n,
                "Local bucket exhausted"
            );
            false
        }
    }

    /// Tokens left after the last check
    pub fn tokens(&self) -> f64 {
        self.state.lock().tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::time::Duration;

    fn epoch(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_local_bucket_allows_burst_up_to_capacity() {
        let bucket = LocalTokenBucket::new(5, 10);
        let now = epoch(1_000);

        for i in 0..10 {
            assert!(bucket.allow_n(now, 1), "Request {} should be allowed", i);
        }
        assert!(!bucket.allow_n(now, 1));
        assert_eq!(bucket.tokens(), 0.0);
    }

    #[test]
    fn test_local_bucket_denial_does_not_consume() {
        let bucket = LocalTokenBucket::new(1, 4);
        let now = epoch(1_000);

        assert!(bucket.allow_n(now, 3));
        assert!(!bucket.allow_n(now, 2));
        assert_eq!(bucket.tokens(), 1.0);
        assert!(bucket.allow_n(now, 1));
    }

    #[test]
    fn test_local_bucket_never_admits_more_than_capacity() {
        let bucket = LocalTokenBucket::new(100, 10);
        assert!(!bucket.allow_n(epoch(1_000), 11));
        assert!(!bucket.allow_n(epoch(5_000), 11));
        assert_eq!(bucket.tokens(), 10.0);
    }

    #[test]
    fn test_local_bucket_replenishment() {
        let bucket = LocalTokenBucket::new(2, 2);
        let start = epoch(1_000);

        assert!(bucket.allow_n(start, 2));
        assert!(!bucket.allow_n(start, 1));

        let half_second = start + Duration::from_millis(500);
        assert!(bucket.allow_n(half_second, 1));
        assert!(!bucket.allow_n(half_second, 1));

        // A long idle period refills only up to capacity
        let later = start + Duration::from_secs(60);
        assert!(bucket.allow_n(later, 2));
        assert!(!bucket.allow_n(later, 1));
    }

    #[test]
    fn test_local_bucket_ignores_earlier_instants() {
        let bucket = LocalTokenBucket::new(10, 10);
        let now = epoch(1_000);

        assert!(bucket.allow_n(now, 10));
        assert!(!bucket.allow_n(now - Duration::from_secs(30), 1));
        assert!(bucket.allow_n(now + Duration::from_millis(100), 1));
    }

    #[test]
    fn test_local_bucket_steady_rate_is_always_admitted() {
        let rate = 20;
        let bucket = LocalTokenBucket::new(rate, 1);
        let step = Duration::from_nanos(1_000_000_000 / rate as u64);
        let mut now = epoch(1_000);

        for i in 0..1_000 {
            assert!(bucket.allow_n(now, 1), "Tick {} should be allowed", i);
            now += step;
        }
    }

    #[test]
    fn test_local_bucket_tokens_stay_within_bounds() {
        let mut rng = rand::thread_rng();

        for _ in 0..50 {
            let rate = rng.gen_range(1..50);
            let capacity = rng.gen_range(1..50);
            let bucket = LocalTokenBucket::new(rate, capacity);
            let mut now = epoch(1_000);

            for _ in 0..200 {
                now += Duration::from_millis(rng.gen_range(0..500));
                bucket.allow_n(now, rng.gen_range(0..capacity + 5));

                let tokens = bucket.tokens();
                assert!(tokens >= 0.0, "tokens went negative: {}", tokens);
                assert!(tokens <= capacity as f64, "tokens exceeded capacity: {}", tokens);
            }
        }
    }

    #[test]
    fn test_local_bucket_concurrent_callers_share_tokens() {
        let bucket = std::sync::Arc::new(LocalTokenBucket::new(1, 100));
        let now = epoch(1_000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = bucket.clone();
                std::thread::spawn(move || (0..50).filter(|_| bucket.allow_n(now, 1)).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
    }
}
