//! Cache-aside retrieval.
//!
//! The read, fetch and write-back steps are not one transaction: two concurrent misses on the
//! same key both reach the provider and the later write wins. Entries are idempotent and
//! bounded by their TTL, so no per-key locking is done here.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::{
    cache::CacheCoordinator,
    error::{Result, WeatherError},
    model::{Location, WeatherRequest, WeatherResponse},
    provider::WeatherProvider,
};

#[derive(Debug, Clone)]
pub struct WeatherOrchestrator {
    cache: CacheCoordinator,
    provider: Arc<dyn WeatherProvider>,
}

impl WeatherOrchestrator {
    pub fn new(cache: CacheCoordinator, provider: Arc<dyn WeatherProvider>) -> Self {
        Self { cache, provider }
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Serve `request` from the cache, or fetch it and populate the cache.
    ///
    /// A failed fetch never reaches the write-back step. Cache failures are reported, not
    /// treated as misses.
    pub async fn retrieve(&self, request: &WeatherRequest) -> Result<WeatherResponse> {
        let key = self.cache.derive_key(request);

        if let Some(data) = self.cache.get(&key).await? {
            tracing::debug!(key = %key, "serving weather from cache");
            return Ok(WeatherResponse::new(data, true));
        }

        let provider = self.provider.provider_name();
        if !self.provider.is_available().await {
            tracing::warn!(provider, "weather provider unavailable");
            return Err(WeatherError::ServiceUnavailable {
                provider: provider.to_owned(),
            });
        }

        let data = self.provider.fetch(request).await.map_err(|e| {
            tracing::warn!(provider, error = %e, "weather fetch failed");
            WeatherError::operation("weather fetch", e)
        })?;

        self.cache.put(&key, &data).await?;
        tracing::debug!(key = %key, provider, "cached fresh weather");

        Ok(WeatherResponse::new(data, false))
    }

    /// Weather for a named place. Names are validated before anything else happens.
    pub async fn get_weather(
        &self,
        city: &str,
        country: &str,
        date: NaiveDate,
        include_hourly: bool,
    ) -> Result<WeatherResponse> {
        let location = Location::from_city(city, country)?;
        let request = WeatherRequest::new(location, date, include_hourly)?;
        self.retrieve(&request).await
    }

    /// Weather at a coordinate pair.
    pub async fn get_weather_at(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
        include_hourly: bool,
    ) -> Result<WeatherResponse> {
        let location = Location::from_coordinates(latitude, longitude)?;
        let request = WeatherRequest::new(location, date, include_hourly)?;
        self.retrieve(&request).await
    }
}
