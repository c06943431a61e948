use crate::{
    Config, WeatherData, WeatherRequest,
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::{convert::TryFrom, fmt::Debug, time::Duration};

pub mod openweather;
pub mod weatherapi;

/// Upper bound for a single upstream HTTP call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi."
            )),
        }
    }
}

/// Upstream source of truth for weather data.
///
/// Retries and timeouts are the implementation's business; the orchestrator calls `fetch`
/// once per cache miss and reports whatever error comes back.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, request: &WeatherRequest) -> anyhow::Result<WeatherData>;

    /// Cheap readiness check; `false` makes the orchestrator fail fast without fetching.
    async fn is_available(&self) -> bool;

    fn provider_name(&self) -> &str;
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let api_key = config.provider_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `weather configure {id}` and enter your API key."
        )
    })?;

    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => Box::new(OpenWeatherProvider::new(api_key.to_owned())?),
        ProviderId::WeatherApi => Box::new(WeatherApiProvider::new(api_key.to_owned())?),
    };

    Ok(boxed)
}

/// Construct the default provider from config, using `default_provider` field.
pub fn default_provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let id = config.default_provider_id()?;
    provider_from_config(id, config)
}

/// Which upstream endpoint a request date maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DateRequest {
    Current,
    Past(DateTime<Utc>),
    Future(DateTime<Utc>),
}

/// Today means current conditions; other days are looked up at noon UTC.
pub(crate) fn classify_date(today: NaiveDate, date: NaiveDate) -> DateRequest {
    let noon = date
        .and_hms_opt(12, 0, 0)
        .unwrap_or_else(|| date.and_time(NaiveTime::default()))
        .and_utc();

    match date.cmp(&today) {
        std::cmp::Ordering::Equal => DateRequest::Current,
        std::cmp::Ordering::Less => DateRequest::Past(noon),
        std::cmp::Ordering::Greater => DateRequest::Future(noon),
    }
}

/// `"city,country"` for named locations, `None` when coordinates identify the place.
pub(crate) fn named_query(request: &WeatherRequest) -> Option<String> {
    let location = request.location();
    if location.has_coordinates() {
        return None;
    }
    match (location.city(), location.country()) {
        (Some(city), Some(country)) => Some(format!("{city},{country}")),
        (Some(city), None) => Some(city.to_owned()),
        _ => None,
    }
}

pub(crate) fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))
}

pub(crate) fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Clamp a provider humidity reading into a percentage.
pub(crate) fn humidity_pct(raw: f64) -> u8 {
    raw.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(ProviderId::OpenWeather, &cfg).unwrap_err();
        assert!(err.to_string().contains("No API key configured for provider"));
    }

    #[test]
    fn default_provider_from_config_errors_when_not_set() {
        let cfg = Config::default();
        let err = default_provider_from_config(&cfg).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("No default provider configured"));
        assert!(msg.contains("Hint: run `weather configure"));
    }

    #[test]
    fn default_provider_from_config_works_when_set_and_configured() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".to_string());

        let provider = default_provider_from_config(&cfg).unwrap();
        assert_eq!(provider.provider_name(), "weatherapi");
    }

    #[test]
    fn classify_date_relative_to_today() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let yesterday = today.pred_opt().unwrap();
        let tomorrow = today.succ_opt().unwrap();

        assert_eq!(classify_date(today, today), DateRequest::Current);
        assert!(matches!(classify_date(today, yesterday), DateRequest::Past(_)));
        match classify_date(today, tomorrow) {
            DateRequest::Future(at) => assert_eq!(at.to_rfc3339(), "2026-10-20T12:00:00+00:00"),
            other => panic!("expected future, got {other:?}"),
        }
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(300);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn humidity_is_clamped() {
        assert_eq!(humidity_pct(59.6), 60);
        assert_eq!(humidity_pct(104.0), 100);
        assert_eq!(humidity_pct(-3.0), 0);
    }
}
