//! Per-client token-bucket rate limiting, backed by [`crate::cache`].
//!
//! Each client (identified by a fingerprint of its remote address, or
//! remote address + user agent, depending on configuration) gets a lazily
//! created [`TokenBucket`] stored in the cache. The bucket's own state is
//! internally synchronized with atomics; the cache only provides the
//! container and its ring-buffer aging behavior.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{Cache, CacheValue};

/// `max_age` used when fetching a bucket from the cache: large enough
/// that a bucket is, for practical purposes, never aged out while the
/// server process lives, short of the ring simply wrapping past it.
pub const BUCKET_MAX_AGE_NANOS: u64 = 900_000_000_000;

/// A token bucket rate limiter: `burst` tokens, refilled at `rate` tokens
/// per second.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u64,
    tokens: AtomicU64,
    refill_rate: f64,
    last_refill_nanos: AtomicU64,
    epoch: Instant,
}

impl TokenBucket {
    /// Create a new bucket, starting full.
    pub fn new(rate_per_second: f64, burst: u64) -> Self {
        Self {
            capacity: burst,
            tokens: AtomicU64::new(burst),
            refill_rate: rate_per_second,
            last_refill_nanos: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn refill(&self) {
        let now = self.now_nanos();
        let last = self.last_refill_nanos.load(Ordering::Acquire);
        let elapsed_nanos = now.saturating_sub(last);
        let elapsed_secs = elapsed_nanos as f64 / 1_000_000_000.0;
        let to_add = (elapsed_secs * self.refill_rate) as u64;

        if to_add > 0 {
            self.last_refill_nanos.store(now, Ordering::Release);
            loop {
                let current = self.tokens.load(Ordering::Acquire);
                let next = (current + to_add).min(self.capacity);
                if self
                    .tokens
                    .compare_exchange(current, next, Ordering::Release, Ordering::Acquire)
                    .is_ok()
                {
                    break;
                }
            }
        }
    }

    /// Attempt to consume one token. Returns `true` if the request is
    /// allowed.
    pub fn allow(&self) -> bool {
        self.refill();
        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current == 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - 1, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

/// Which part of the request identifies the client for rate-limiting
/// purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKeyMode {
    /// Key on the remote IP address alone.
    RemoteIp,
    /// Key on the remote IP address plus the User-Agent header.
    RemoteIpAndUserAgent,
}

/// A per-vhost rate limiter. Buckets are created lazily per client key and
/// stored in the shared [`Cache`].
#[derive(Clone)]
pub struct Limiter {
    cache: Cache,
    rate_per_second: f64,
    burst: u64,
}

impl Limiter {
    /// Create a limiter with the given per-minute rate and burst, sharing
    /// `cache` as its bucket store.
    pub fn new(cache: Cache, rate_per_minute: f64, burst: u64) -> Self {
        Self {
            cache,
            rate_per_second: rate_per_minute / 60.0,
            burst,
        }
    }

    /// Check whether `client_key` is allowed to proceed, creating a fresh
    /// bucket on first use and re-storing it afterward so its ring
    /// position stays fresh.
    pub fn check(&self, client_key: &[u8]) -> bool {
        let bucket = match self.cache.get(client_key, BUCKET_MAX_AGE_NANOS) {
            Some(CacheValue::RateLimiter(bucket)) => bucket,
            _ => Arc::new(TokenBucket::new(self.rate_per_second, self.burst)),
        };

        let allowed = bucket.allow();
        self.cache
            .set(client_key, CacheValue::RateLimiter(bucket));
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    /// Scenario 6: rate=60/min, burst=1. Two requests from the same
    /// client within 1s: the second is denied. After waiting past the
    /// refill interval, the next request is allowed again.
    #[test]
    fn token_bucket_refills_after_interval() {
        let cache = Cache::new();
        let limiter = Limiter::new(cache, 60.0, 1);

        assert!(limiter.check(b"10.0.0.1"));
        assert!(!limiter.check(b"10.0.0.1"));

        sleep(Duration::from_millis(1100));
        assert!(limiter.check(b"10.0.0.1"));
    }

    #[test]
    fn independent_clients_have_independent_buckets() {
        let cache = Cache::new();
        let limiter = Limiter::new(cache, 60.0, 1);

        assert!(limiter.check(b"10.0.0.1"));
        assert!(limiter.check(b"10.0.0.2"));
        assert!(!limiter.check(b"10.0.0.1"));
    }

    #[test]
    fn burst_allows_burst_many_immediate_requests() {
        let cache = Cache::new();
        let limiter = Limiter::new(cache, 60.0, 5);
        for _ in 0..5 {
            assert!(limiter.check(b"client"));
        }
        assert!(!limiter.check(b"client"));
    }
}
