//! In-process token bucket.
//!
//! Each client owns a bucket holding at most `max_requests` tokens, refilled continuously at
//! `max_requests / window`. A client seen for the first time starts with a full bucket.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::rate_limit::{RateLimitConfig, RateLimiterPort};

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, capacity: f64, per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = refill_tokens(self.tokens, elapsed, capacity, per_sec);
        self.last_refill = now;
    }
}

/// Tokens after `elapsed_secs` of continuous refill, capped at `capacity`.
pub(crate) fn refill_tokens(tokens: f64, elapsed_secs: f64, capacity: f64, per_sec: f64) -> f64 {
    (tokens + elapsed_secs.max(0.0) * per_sec).min(capacity)
}

/// Per-client buckets kept in memory.
///
/// A bucket stays tracked after it refills. A long-lived process serving many distinct
/// clients should call [`TokenBucketLimiter::prune_idle`] periodically.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    buckets: DashMap<String, Bucket>,
    capacity: f64,
    refill_per_sec: f64,
}

impl TokenBucketLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = f64::from(config.max_requests());
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_per_sec: capacity / config.window().as_secs_f64(),
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Forget clients whose bucket has been full for at least `idle`.
    pub fn prune_idle(&self, idle: Duration) {
        let now = Instant::now();
        let (capacity, per_sec) = (self.capacity, self.refill_per_sec);
        self.buckets.retain(|_, bucket| {
            let mut refilled = *bucket;
            refilled.refill(capacity, per_sec, now);
            let idle_for = now.saturating_duration_since(bucket.last_refill);
            !(refilled.tokens >= capacity && idle_for >= idle)
        });
    }
}

#[async_trait]
impl RateLimiterPort for TokenBucketLimiter {
    async fn try_consume(&self, client_id: &str) -> anyhow::Result<bool> {
        let now = Instant::now();
        // the entry guard holds the shard lock, so refill + take is atomic per client
        let mut bucket = self
            .buckets
            .entry(client_id.to_owned())
            .or_insert_with(|| Bucket::full(self.capacity, now));

        bucket.refill(self.capacity, self.refill_per_sec, now);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn available_tokens(&self, client_id: &str) -> anyhow::Result<u32> {
        let now = Instant::now();
        let tokens = match self.buckets.get(client_id) {
            Some(bucket) => {
                let mut refilled = *bucket;
                refilled.refill(self.capacity, self.refill_per_sec, now);
                refilled.tokens
            }
            None => self.capacity,
        };
        Ok(tokens.floor() as u32)
    }

    async fn reset(&self, client_id: &str) -> anyhow::Result<()> {
        self.buckets.remove(client_id);
        Ok(())
    }
}
