//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - Input validation for location names, cache keys and client identifiers
//! - Cache-aside weather retrieval over a pluggable cache
//! - Per-client token-bucket rate limiting
//! - Abstraction over weather providers, with OpenWeather and WeatherAPI adapters
//! - Configuration & credentials handling
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod rate_limit;
pub mod service;
pub mod validation;

pub use cache::{CacheCoordinator, CacheKey, CachePort, FileCache, MemoryCache};
pub use config::{CacheConfig, Config, ProviderConfig, RateLimitSettings};
pub use error::{Result, ValidationError, WeatherError};
pub use model::{Location, WeatherData, WeatherRequest, WeatherResponse};
pub use orchestrator::WeatherOrchestrator;
pub use provider::{ProviderId, WeatherProvider};
pub use rate_limit::{
    FileRateLimiter, RateLimitConfig, RateLimitCoordinator, RateLimiterPort, TokenBucketLimiter,
};
pub use service::WeatherService;
