use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    model::{WeatherData, WeatherRequest},
    provider::{
        DateRequest, classify_date, http_client, humidity_pct, named_query, truncate_body,
        unix_to_utc,
    },
};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "http://api.weatherapi.com/v1";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            http: http_client()?,
        })
    }

    /// WeatherAPI takes `q=lat,lon` as well as `q=city,country`.
    fn location_param(request: &WeatherRequest) -> String {
        named_query(request).unwrap_or_else(|| {
            let location = request.location();
            format!("{},{}", location.latitude(), location.longitude())
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        label: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .with_context(|| format!("Failed to send request to WeatherAPI.com ({label})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read WeatherAPI {label} response body"))?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "WeatherAPI {label} request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        serde_json::from_str(&body).with_context(|| format!("Failed to parse WeatherAPI {label} JSON"))
    }

    async fn fetch_current(&self, request: &WeatherRequest) -> Result<WeatherData> {
        let params = [("q", Self::location_param(request))];
        let parsed: WaResponse = self.get_json("current.json", "current", &params).await?;

        let ts = parsed.current.last_updated_epoch.or(parsed.location.localtime_epoch);
        let observation_time = ts.and_then(unix_to_utc).unwrap_or_else(Utc::now);

        WeatherData::new(
            parsed.current.temp_c,
            humidity_pct(parsed.current.humidity),
            &parsed.current.condition.text,
            request.location().clone(),
            observation_time,
        )
        .context("WeatherAPI returned implausible weather data")
    }

    async fn fetch_at(
        &self,
        request: &WeatherRequest,
        when: DateTime<Utc>,
        is_forecast: bool,
    ) -> Result<WeatherData> {
        let (endpoint, label) = if is_forecast {
            ("forecast.json", "forecast")
        } else {
            ("history.json", "history")
        };

        let unixdt = when.timestamp();
        let hour = when.hour(); // 0–23

        let params = [
            ("q", Self::location_param(request)),
            ("unixdt", unixdt.to_string()),
            ("hour", hour.to_string()),
        ];
        let parsed: WaForecastResponse = self.get_json(endpoint, label, &params).await?;

        let day = parsed.forecast.forecastday.first().ok_or_else(|| {
            anyhow::anyhow!("WeatherAPI response contained no forecastday data")
        })?;

        let hour_entry = day
            .hour
            .iter()
            .min_by_key(|h| (h.time_epoch - unixdt).abs())
            .ok_or_else(|| anyhow::anyhow!("WeatherAPI response contained no hourly data"))?;

        let observation_time = unix_to_utc(hour_entry.time_epoch).unwrap_or_else(Utc::now);

        WeatherData::new(
            hour_entry.temp_c,
            humidity_pct(hour_entry.humidity),
            &hour_entry.condition.text,
            request.location().clone(),
            observation_time,
        )
        .context("WeatherAPI returned implausible weather data")
    }
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    localtime_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    humidity: f64,
    condition: WaCondition,
    last_updated_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: WaLocation,
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaForecastHour {
    time_epoch: i64,
    temp_c: f64,
    humidity: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    hour: Vec<WaForecastHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    forecast: WaForecast,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn fetch(&self, request: &WeatherRequest) -> Result<WeatherData> {
        let date_req = classify_date(Utc::now().date_naive(), request.date());

        tracing::info!(provider = "weatherapi", date = %request.date(), "fetching weather");

        match date_req {
            DateRequest::Current => self.fetch_current(request).await,
            // future → forecast.json
            DateRequest::Future(dt) => self.fetch_at(request, dt, true).await,
            // past → history.json
            DateRequest::Past(dt) => self.fetch_at(request, dt, false).await,
        }
    }

    async fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn provider_name(&self) -> &str {
        "weatherapi"
    }
}
