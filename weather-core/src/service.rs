//! Entry point for callers such as a CLI or a web controller.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::{
    Config,
    cache::{CacheCoordinator, CacheKey, CachePort},
    error::Result,
    model::{WeatherData, WeatherRequest, WeatherResponse},
    orchestrator::WeatherOrchestrator,
    provider::WeatherProvider,
    rate_limit::{RateLimitCoordinator, RateLimiterPort},
};

#[derive(Debug, Clone)]
pub struct WeatherService {
    orchestrator: WeatherOrchestrator,
    limits: RateLimitCoordinator,
}

impl WeatherService {
    pub fn new(orchestrator: WeatherOrchestrator, limits: RateLimitCoordinator) -> Self {
        Self {
            orchestrator,
            limits,
        }
    }

    /// Wire the coordinators from configuration. Invalid TTL or quota settings fail here.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn WeatherProvider>,
        cache: Arc<dyn CachePort>,
        limiter: Arc<dyn RateLimiterPort>,
    ) -> Result<Self> {
        let cache = CacheCoordinator::new(cache, config.cache.default_ttl())?;
        let limits = RateLimitCoordinator::new(
            limiter,
            config.rate_limit.max_requests,
            config.rate_limit.window(),
        )?;
        Ok(Self::new(WeatherOrchestrator::new(cache, provider), limits))
    }

    /// Requests each client may make per window.
    pub fn max_requests(&self) -> u32 {
        self.limits.max_requests()
    }

    pub fn provider_name(&self) -> &str {
        self.orchestrator.provider_name()
    }

    /// Weather for an already validated request.
    pub async fn retrieve(&self, request: &WeatherRequest) -> Result<WeatherResponse> {
        self.orchestrator.retrieve(request).await
    }

    pub async fn get_weather(
        &self,
        city: &str,
        country: &str,
        date: NaiveDate,
        include_hourly: bool,
    ) -> Result<WeatherResponse> {
        self.orchestrator
            .get_weather(city, country, date, include_hourly)
            .await
    }

    pub async fn get_weather_at(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
        include_hourly: bool,
    ) -> Result<WeatherResponse> {
        self.orchestrator
            .get_weather_at(latitude, longitude, date, include_hourly)
            .await
    }

    /// Store `data` under a caller-chosen key; `ttl` falls back to the configured default.
    pub async fn cache_weather(&self, key: &str, data: &WeatherData, ttl: Option<Duration>) -> Result<()> {
        let key = CacheKey::parse(key)?;
        let cache = self.orchestrator.cache();
        match ttl {
            Some(ttl) => cache.put_with_ttl(&key, data, ttl).await,
            None => cache.put(&key, data).await,
        }
    }

    pub async fn retrieve_cached(&self, key: &str) -> Result<Option<WeatherData>> {
        let key = CacheKey::parse(key)?;
        self.orchestrator.cache().get(&key).await
    }

    pub async fn invalidate(&self, key: &str) -> Result<()> {
        let key = CacheKey::parse(key)?;
        self.orchestrator.cache().evict(&key).await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.orchestrator.cache().clear().await
    }

    pub async fn check_rate_limit(&self, client_id: &str) -> Result<bool> {
        self.limits.check_available(client_id).await
    }

    pub async fn consume_rate_limit(&self, client_id: &str) -> Result<bool> {
        self.limits.consume(client_id).await
    }

    pub async fn remaining_tokens(&self, client_id: &str) -> Result<u32> {
        self.limits.remaining(client_id).await
    }

    pub async fn reset_rate_limit(&self, client_id: &str) -> Result<()> {
        self.limits.reset(client_id).await
    }
}
