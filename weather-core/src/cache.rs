use std::{fmt, sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::Duration;
use sha2::{Digest, Sha256};

use crate::{
    error::{Result, WeatherError},
    model::{Location, WeatherData, WeatherRequest},
    validation::{self, CACHE_KEY},
};

pub mod file;
pub mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

/// Namespace shared by every key this crate derives.
pub const KEY_PREFIX: &str = "weather:v1";

/// Default time-to-live for cached weather.
pub const DEFAULT_TTL_SECS: i64 = 30 * 60;

/// Storage behind the cache coordinator.
///
/// Implementations must be safe to call concurrently and must treat expired entries as absent.
#[async_trait]
pub trait CachePort: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> anyhow::Result<Option<WeatherData>>;

    async fn put(&self, key: &str, value: &WeatherData, ttl: StdDuration) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    async fn clear(&self) -> anyhow::Result<()>;
}

/// A cache key that passed the cache-key gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn parse(raw: &str) -> Result<Self> {
        validation::validate_cache_key(raw).map(|key| Self(key.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Maps requests to keys and owns the TTL policy in front of a [`CachePort`].
#[derive(Debug, Clone)]
pub struct CacheCoordinator {
    port: Arc<dyn CachePort>,
    default_ttl: Duration,
}

impl CacheCoordinator {
    /// Fails when `default_ttl` is not positive.
    pub fn new(port: Arc<dyn CachePort>, default_ttl: Duration) -> Result<Self> {
        if default_ttl <= Duration::zero() {
            return Err(WeatherError::validation(
                "default ttl",
                format!("must be positive, got {}s", default_ttl.num_seconds()),
            ));
        }
        Ok(Self { port, default_ttl })
    }

    pub fn with_default_ttl(port: Arc<dyn CachePort>) -> Self {
        Self {
            port,
            default_ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Deterministic key for a request: namespace, location identity, ISO date, hourly flag.
    pub fn derive_key(&self, request: &WeatherRequest) -> CacheKey {
        derive_key(request)
    }

    pub async fn get(&self, key: &CacheKey) -> Result<Option<WeatherData>> {
        let found = self
            .port
            .get(key.as_str())
            .await
            .map_err(|e| WeatherError::operation("cache read", e))?;

        tracing::debug!(key = %key, hit = found.is_some(), "cache lookup");
        Ok(found)
    }

    pub async fn put(&self, key: &CacheKey, data: &WeatherData) -> Result<()> {
        self.put_with_ttl(key, data, self.default_ttl).await
    }

    /// Store with an explicit TTL; a negative TTL is refused before the port is called.
    pub async fn put_with_ttl(&self, key: &CacheKey, data: &WeatherData, ttl: Duration) -> Result<()> {
        let ttl = ttl.to_std().map_err(|_| {
            WeatherError::validation(
                "ttl",
                format!("must not be negative, got {}s", ttl.num_seconds()),
            )
        })?;

        self.port
            .put(key.as_str(), data, ttl)
            .await
            .map_err(|e| WeatherError::operation("cache write", e))?;

        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache write");
        Ok(())
    }

    pub async fn evict(&self, key: &CacheKey) -> Result<()> {
        self.port
            .delete(key.as_str())
            .await
            .map_err(|e| WeatherError::operation("cache delete", e))
    }

    pub async fn contains(&self, key: &CacheKey) -> Result<bool> {
        self.port
            .exists(key.as_str())
            .await
            .map_err(|e| WeatherError::operation("cache exists", e))
    }

    pub async fn clear(&self) -> Result<()> {
        self.port
            .clear()
            .await
            .map_err(|e| WeatherError::operation("cache clear", e))?;
        tracing::info!("cache cleared");
        Ok(())
    }
}

/// See [`CacheCoordinator::derive_key`].
pub fn derive_key(request: &WeatherRequest) -> CacheKey {
    let flag = if request.include_hourly() { "hourly" } else { "daily" };
    let date = request.date().format("%Y-%m-%d");

    let identity = location_identity(request.location());
    // prefix + ":" + identity + ":" + date(10) + ":" + flag(6 at most)
    let fixed_len = KEY_PREFIX.len() + 1 + 1 + 10 + 1 + 6;

    let identity = if fixed_len + identity.len() > CACHE_KEY.max_len {
        hashed_identity(request.location())
    } else {
        identity
    };

    CacheKey(format!("{KEY_PREFIX}:{identity}:{date}:{flag}"))
}

fn location_identity(location: &Location) -> String {
    if location.has_coordinates() {
        return format!("geo:{:.4}_{:.4}", location.latitude(), location.longitude());
    }

    let city = escape_name(location.city().unwrap_or_default());
    let country = escape_name(location.country().unwrap_or_default());
    format!("name:{city}:{country}")
}

fn hashed_identity(location: &Location) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_name(location.city().unwrap_or_default()).as_bytes());
    // NUL cannot appear in a validated name
    hasher.update([0u8]);
    hasher.update(normalize_name(location.country().unwrap_or_default()).as_bytes());
    format!("hash:{:x}", hasher.finalize())
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Injective mapping of a place name into the cache-key alphabet.
///
/// `.` only ever appears as the delimiter of an escaped code point, so two different names
/// cannot produce the same output.
fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in normalize_name(name).chars() {
        match c {
            'a'..='z' | '0'..='9' | '-' => out.push(c),
            ' ' => out.push('_'),
            other => out.push_str(&format!(".{:x}.", other as u32)),
        }
    }
    out
}
