use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, WeatherError},
    validation,
};

/// Lowest temperature (°C) accepted as physically plausible.
pub const MIN_TEMPERATURE_C: f64 = -100.0;
/// Highest temperature (°C) accepted as physically plausible.
pub const MAX_TEMPERATURE_C: f64 = 70.0;

/// A place on earth, identified by coordinates or by city and country.
///
/// Name-based locations carry `(0.0, 0.0)` as coordinates; a location at exactly
/// `(0.0, 0.0)` must therefore carry both names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    latitude: f64,
    longitude: f64,
    city: Option<String>,
    country: Option<String>,
}

impl Location {
    pub fn new(
        latitude: f64,
        longitude: f64,
        city: Option<&str>,
        country: Option<&str>,
    ) -> Result<Self> {
        let latitude = validation::validate_latitude(latitude)?;
        let longitude = validation::validate_longitude(longitude)?;
        let city = city
            .map(|c| validation::validate_location_name("city", c).map(str::to_owned))
            .transpose()?;
        let country = country
            .map(|c| validation::validate_location_name("country", c).map(str::to_owned))
            .transpose()?;

        let location = Self {
            latitude,
            longitude,
            city,
            country,
        };

        if !location.has_coordinates() && (location.city.is_none() || location.country.is_none()) {
            return Err(WeatherError::validation(
                "location",
                "either non-zero coordinates or both city and country are required",
            ));
        }

        Ok(location)
    }

    pub fn from_city(city: &str, country: &str) -> Result<Self> {
        Self::new(0.0, 0.0, Some(city), Some(country))
    }

    pub fn from_coordinates(latitude: f64, longitude: f64) -> Result<Self> {
        Self::new(latitude, longitude, None, None)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// Coordinates identify the location unless both are exactly zero.
    pub fn has_coordinates(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0
    }

    /// Human-readable label: "City, Country" when known, coordinates otherwise.
    pub fn display_name(&self) -> String {
        match (&self.city, &self.country) {
            (Some(city), Some(country)) => format!("{city}, {country}"),
            (Some(city), None) => city.clone(),
            _ => format!("{:.4}, {:.4}", self.latitude, self.longitude),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRequest {
    location: Location,
    date: NaiveDate,
    include_hourly: bool,
}

impl WeatherRequest {
    /// Build a request; the date must lie within the supported window around today.
    pub fn new(location: Location, date: NaiveDate, include_hourly: bool) -> Result<Self> {
        let date = validation::validate_date(date)?;
        Ok(Self {
            location,
            date,
            include_hourly,
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn include_hourly(&self) -> bool {
        self.include_hourly
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    temperature_c: f64,
    humidity_pct: u8,
    description: String,
    location: Location,
    timestamp: DateTime<Utc>,
}

impl WeatherData {
    pub fn new(
        temperature_c: f64,
        humidity_pct: u8,
        description: &str,
        location: Location,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if !temperature_c.is_finite()
            || !(MIN_TEMPERATURE_C..=MAX_TEMPERATURE_C).contains(&temperature_c)
        {
            return Err(WeatherError::validation(
                "temperature",
                format!(
                    "must be between {MIN_TEMPERATURE_C} and {MAX_TEMPERATURE_C} °C, got {temperature_c}"
                ),
            ));
        }

        if humidity_pct > 100 {
            return Err(WeatherError::validation(
                "humidity",
                format!("must be between 0 and 100, got {humidity_pct}"),
            ));
        }

        let description = description.trim();
        if description.is_empty() {
            return Err(WeatherError::validation("description", "must not be empty"));
        }

        Ok(Self {
            temperature_c,
            humidity_pct,
            description: description.to_owned(),
            location,
            timestamp,
        })
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn humidity_pct(&self) -> u8 {
        self.humidity_pct
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherResponse {
    data: WeatherData,
    cached: bool,
    generated_at: DateTime<Utc>,
}

impl WeatherResponse {
    pub fn new(data: WeatherData, cached: bool) -> Self {
        Self {
            data,
            cached,
            generated_at: Utc::now(),
        }
    }

    pub fn data(&self) -> &WeatherData {
        &self.data
    }

    pub fn into_data(self) -> WeatherData {
        self.data
    }

    /// Whether the data was served from the cache.
    pub fn cached(&self) -> bool {
        self.cached
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}
