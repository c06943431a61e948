use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
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

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// The free plan forecasts at most this many days ahead and has no history.
pub const FORECAST_DAYS: i64 = 5;

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
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

    fn query(&self, request: &WeatherRequest) -> Vec<(&'static str, String)> {
        let mut query = match named_query(request) {
            Some(q) => vec![("q", q)],
            None => vec![
                ("lat", request.location().latitude().to_string()),
                ("lon", request.location().longitude().to_string()),
            ],
        };
        query.push(("appid", self.api_key.clone()));
        query.push(("units", "metric".to_owned()));
        query
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        label: &str,
        request: &WeatherRequest,
    ) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&self.query(request))
            .send()
            .await
            .with_context(|| format!("Failed to send request to OpenWeather ({label})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read OpenWeather {label} response body"))?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeather {label} request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse OpenWeather {label} JSON"))
    }

    async fn fetch_current(&self, request: &WeatherRequest) -> Result<WeatherData> {
        let parsed: OwCurrentResponse = self.get_json("weather", "current", request).await?;

        let observation_time = unix_to_utc(parsed.dt).unwrap_or_else(Utc::now);

        to_weather_data(&parsed.main, &parsed.weather, request, observation_time)
    }

    async fn fetch_forecast(&self, request: &WeatherRequest, when: DateTime<Utc>) -> Result<WeatherData> {
        let parsed: OwForecastResponse = self.get_json("forecast", "forecast", request).await?;

        let target_ts = when.timestamp();

        let entry = parsed
            .list
            .iter()
            .min_by_key(|e| (e.dt - target_ts).abs())
            .ok_or_else(|| anyhow!("OpenWeather forecast response contained no data"))?;

        let observation_time = unix_to_utc(entry.dt).unwrap_or_else(Utc::now);

        to_weather_data(&entry.main, &entry.weather, request, observation_time)
    }
}

fn to_weather_data(
    main: &OwMain,
    weather: &[OwWeather],
    request: &WeatherRequest,
    observation_time: DateTime<Utc>,
) -> Result<WeatherData> {
    let condition = weather
        .first()
        .map(|w| w.description.as_str())
        .unwrap_or("Unknown");

    WeatherData::new(
        main.temp,
        humidity_pct(main.humidity),
        condition,
        request.location().clone(),
        observation_time,
    )
    .context("OpenWeather returned implausible weather data")
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch(&self, request: &WeatherRequest) -> Result<WeatherData> {
        let now = Utc::now();
        let date_req = classify_date(now.date_naive(), request.date());

        tracing::info!(provider = "openweather", date = %request.date(), "fetching weather");

        match date_req {
            DateRequest::Current => self.fetch_current(request).await,
            DateRequest::Past(dt) => Err(anyhow!(
                "Historical weather ({}) is not supported by free OpenWeather API.\n\
                 Only current weather and up to {FORECAST_DAYS} days forecast are available.",
                dt
            )),
            DateRequest::Future(dt) => {
                let max_forecast = now + Duration::days(FORECAST_DAYS);
                if dt > max_forecast {
                    Err(anyhow!(
                        "Requested date {} exceeds the {FORECAST_DAYS}-day forecast limit of free OpenWeather API.\n\
                         Allowed range: now .. {}.",
                        dt,
                        max_forecast
                    ))
                } else {
                    self.fetch_forecast(request, dt).await
                }
            }
        }
    }

    async fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn provider_name(&self) -> &str {
        "openweather"
    }
}
