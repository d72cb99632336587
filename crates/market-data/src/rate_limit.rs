use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Request budget for one API key, shared by every endpoint called with it.
///
/// Token bucket: up to `burst` requests go out back to back, after which
/// requests are paced at `burst / period`. A free-tier key allowing 5 calls
/// a minute therefore gets one call every 12s once the burst is spent.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    burst: f64,
    refill_per_sec: f64,
}

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    pub fn new(burst: usize, period: Duration) -> Self {
        let burst = burst.max(1) as f64;
        let period = period.as_secs_f64().max(f64::EPSILON);
        Self {
            bucket: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
            burst,
            refill_per_sec: burst / period,
        }
    }

    pub fn per_minute(requests: usize) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Waits for a token. Holding the lock while sleeping keeps waiters in
    /// arrival order.
    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.burst);
        bucket.refilled_at = now;

        if bucket.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec);
            tracing::debug!("Rate limiter: pacing request by {:.2}s", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
            bucket.tokens = 1.0;
            bucket.refilled_at = Instant::now();
        }

        bucket.tokens -= 1.0;
    }
}
