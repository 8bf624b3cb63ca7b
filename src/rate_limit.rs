//! Per-client sliding-window rate limiting.
//!
//! Each key (the client IP) keeps the timestamps of its requests inside the
//! current window. A request is rejected once `max_requests` timestamps are
//! younger than `window`. The limiter is an explicit handle shared through
//! the server state; [`purge`](RateLimiter::purge) drops idle keys.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::error::{GatewayError, Result};

#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    max_requests: usize,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            hits: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_millis(config.window_ms), config.max_requests)
    }

    /// Record a request from `key`, or reject it with
    /// [`GatewayError::RateLimited`].
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let times = hits.entry(key.to_string()).or_default();
        evict(times, now, self.window);

        if times.len() >= self.max_requests {
            return Err(GatewayError::RateLimited {
                retry_after_secs: retry_after_secs(self.window),
            });
        }
        times.push_back(now);
        Ok(())
    }

    /// Drop expired timestamps and forget keys with none left.
    pub fn purge(&self) {
        self.purge_at(Instant::now());
    }

    pub fn purge_at(&self, now: Instant) {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.retain(|_, times| {
            evict(times, now, self.window);
            !times.is_empty()
        });
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.hits.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn evict(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = times.front() {
        if now.saturating_duration_since(oldest) >= window {
            times.pop_front();
        } else {
            break;
        }
    }
}

fn retry_after_secs(window: Duration) -> u64 {
    window.as_millis().div_ceil(1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 20);
        for _ in 0..20 {
            assert!(limiter.check("10.0.0.1").is_ok());
        }
    }

    #[test]
    fn test_over_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        for _ in 0..3 {
            limiter.check("10.0.0.1").unwrap();
        }
        let err = limiter.check("10.0.0.1").unwrap_err();
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(err.retry_after(), Some(60));
        // Other clients are unaffected.
        assert!(limiter.check("10.0.0.2").is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(Duration::from_millis(1000), 2);
        let t0 = Instant::now();
        limiter.check_at("ip", t0).unwrap();
        limiter.check_at("ip", t0 + Duration::from_millis(500)).unwrap();
        assert!(limiter.check_at("ip", t0 + Duration::from_millis(900)).is_err());
        // The first hit has aged out, the second has not.
        limiter.check_at("ip", t0 + Duration::from_millis(1000)).unwrap();
        assert!(limiter.check_at("ip", t0 + Duration::from_millis(1200)).is_err());
    }

    #[test]
    fn test_rejected_requests_are_not_counted() {
        let limiter = RateLimiter::new(Duration::from_millis(1000), 1);
        let t0 = Instant::now();
        limiter.check_at("ip", t0).unwrap();
        for ms in [100, 200, 300] {
            assert!(limiter.check_at("ip", t0 + Duration::from_millis(ms)).is_err());
        }
        limiter.check_at("ip", t0 + Duration::from_millis(1000)).unwrap();
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_millis(60_000)), 60);
    }

    #[test]
    fn test_purge_drops_idle_keys() {
        let limiter = RateLimiter::new(Duration::from_millis(1000), 5);
        let t0 = Instant::now();
        limiter.check_at("old", t0).unwrap();
        limiter.check_at("fresh", t0 + Duration::from_millis(800)).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        limiter.purge_at(t0 + Duration::from_millis(1100));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
