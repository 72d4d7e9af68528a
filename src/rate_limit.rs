//! Per-user request rate limiting.
//!
//! Token buckets keyed by caller id, owned by the app state behind a
//! mutex rather than process-global mutable state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Once the map reaches this many entries, stale buckets are swept on
/// the next request.
const SWEEP_THRESHOLD: usize = 1024;

/// A bucket untouched for this long has fully refilled, so dropping it
/// is indistinguishable from keeping it.
const IDLE_EXPIRY: Duration = Duration::from_secs(60);

/// Token bucket: allows `rate` requests per second with a burst of `burst`.
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: f64) -> Self {
        Self {
            tokens: burst,
            max_tokens: burst,
            refill_rate: rate,
            last_refill: Instant::now(),
        }
    }

    fn allow(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }
}

/// Rate limiter holding one bucket per key (user id).
pub struct KeyedRateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    rate: f64,
    burst: f64,
}

impl KeyedRateLimiter {
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rate,
            burst,
        }
    }

    /// Check if a request from `key` is allowed.
    pub fn allow(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        if buckets.len() >= SWEEP_THRESHOLD {
            Self::sweep(&mut buckets, IDLE_EXPIRY);
        }
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.rate, self.burst));
        bucket.allow()
    }

    /// Evict buckets idle for longer than `expiry` so the map stays
    /// bounded by the set of recently active callers.
    fn sweep(buckets: &mut HashMap<String, TokenBucket>, expiry: Duration) {
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) < expiry);
    }
}
