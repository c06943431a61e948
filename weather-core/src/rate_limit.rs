use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    error::{Result, WeatherError},
    validation,
};

pub mod file;
pub mod token_bucket;

pub use file::FileRateLimiter;
pub use token_bucket::TokenBucketLimiter;

/// Default quota: requests per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 60;
/// Default quota window in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Per-client token buckets owned by an external limiter.
///
/// `try_consume` must be atomic: checking for a token and taking it happen as one step.
#[async_trait]
pub trait RateLimiterPort: Send + Sync + fmt::Debug {
    async fn try_consume(&self, client_id: &str) -> anyhow::Result<bool>;

    async fn available_tokens(&self, client_id: &str) -> anyhow::Result<u32>;

    async fn reset(&self, client_id: &str) -> anyhow::Result<()>;
}

/// Quota settings, checked once when built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    max_requests: u32,
    window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(WeatherError::validation("max requests", "must be greater than zero"));
        }
        if window.is_zero() {
            return Err(WeatherError::validation("window", "must be a positive duration"));
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

/// Enforces per-client quotas through a [`RateLimiterPort`].
#[derive(Debug, Clone)]
pub struct RateLimitCoordinator {
    port: Arc<dyn RateLimiterPort>,
    config: RateLimitConfig,
}

impl RateLimitCoordinator {
    /// Fails on a zero quota or an empty window instead of at the first request.
    pub fn new(port: Arc<dyn RateLimiterPort>, max_requests: u32, window: Duration) -> Result<Self> {
        let config = RateLimitConfig::new(max_requests, window)?;
        Ok(Self::with_config(port, config))
    }

    pub fn with_config(port: Arc<dyn RateLimiterPort>, config: RateLimitConfig) -> Self {
        Self { port, config }
    }

    /// Coordinator over a fresh in-process token bucket.
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::with_config(Arc::new(TokenBucketLimiter::new(config)), config)
    }

    pub fn max_requests(&self) -> u32 {
        self.config.max_requests()
    }

    pub fn window(&self) -> Duration {
        self.config.window()
    }

    /// Whether `client_id` has a token left, without taking it.
    pub async fn check_available(&self, client_id: &str) -> Result<bool> {
        Ok(self.remaining(client_id).await? > 0)
    }

    /// Take one token. `false` means the quota is exhausted.
    pub async fn consume(&self, client_id: &str) -> Result<bool> {
        let client_id = validation::validate_client_id(client_id)?;

        let allowed = self
            .port
            .try_consume(client_id)
            .await
            .map_err(|e| WeatherError::operation("rate limit consume", e))?;

        if allowed {
            tracing::debug!(client_id, "rate limit token consumed");
        } else {
            tracing::warn!(client_id, max_requests = self.max_requests(), "rate limit exhausted");
        }
        Ok(allowed)
    }

    pub async fn remaining(&self, client_id: &str) -> Result<u32> {
        let client_id = validation::validate_client_id(client_id)?;

        self.port
            .available_tokens(client_id)
            .await
            .map_err(|e| WeatherError::operation("rate limit lookup", e))
    }

    pub async fn reset(&self, client_id: &str) -> Result<()> {
        let client_id = validation::validate_client_id(client_id)?;

        self.port
            .reset(client_id)
            .await
            .map_err(|e| WeatherError::operation("rate limit reset", e))?;

        tracing::debug!(client_id, "rate limit reset");
        Ok(())
    }
}
