use leadscout_core::{LeadScoutError, LeadScoutResult};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};

/// Throughput limits for one platform.
#[derive(Debug, Clone, Copy)]
pub struct PlatformLimits {
    /// Sustained request rate.
    pub requests_per_second: f64,
    /// Burst capacity of the token bucket.
    pub burst: u32,
    /// Maximum in-flight requests.
    pub max_concurrency: usize,
    /// Hard deadline for a single adapter call.
    pub timeout: Duration,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            burst: 10,
            max_concurrency: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PlatformLimits {
    /// Limits suitable for tests: effectively unthrottled.
    pub fn unthrottled() -> Self {
        Self {
            requests_per_second: 10_000.0,
            burst: 10_000,
            max_concurrency: 64,
            timeout: Duration::from_secs(30),
        }
    }
}

struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one accrues.
    fn take(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate))
        }
    }
}

/// Per-platform rate limiter: a token bucket for throughput plus a
/// semaphore for the concurrency ceiling.
///
/// Acquisition waits rather than failing; backpressure on a busy platform
/// shows up as queueing, and the caller's own timeout bounds the total
/// wait.
pub struct PlatformLimiter {
    bucket: Mutex<TokenBucket>,
    permits: Semaphore,
    timeout: Duration,
}

impl PlatformLimiter {
    /// Build a limiter from the given limits.
    pub fn new(limits: PlatformLimits) -> Self {
        // A zero rate would never refill; clamp instead of dividing by it.
        let rate = limits.requests_per_second.max(0.01);
        let burst = f64::from(limits.burst.max(1));
        Self {
            bucket: Mutex::new(TokenBucket {
                tokens: burst,
                max_tokens: burst,
                refill_rate: rate,
                last_refill: Instant::now(),
            }),
            permits: Semaphore::new(limits.max_concurrency.max(1)),
            timeout: limits.timeout,
        }
    }

    /// The per-call deadline configured for this platform.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for a throughput token and a concurrency permit.
    ///
    /// The returned permit must be held for the duration of the adapter
    /// call; dropping it releases the concurrency slot.
    pub async fn acquire(&self) -> LeadScoutResult<SemaphorePermit<'_>> {
        loop {
            let wait = self.bucket.lock().take();
            match wait {
                None => break,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
        self.permits
            .acquire()
            .await
            .map_err(|_| LeadScoutError::PlatformUnavailable("limiter shut down".into()))
    }

    /// Tokens currently available, for inspection.
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        bucket.refill();
        bucket.tokens
    }
}
