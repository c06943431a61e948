use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, PasswordDisplayMode};
use weather_core::{
    CacheCoordinator, CacheKey, Config, FileCache, FileRateLimiter, Location, ProviderId,
    RateLimitConfig, RateLimitCoordinator, WeatherData, WeatherOrchestrator, WeatherRequest,
    WeatherResponse, WeatherService, provider::default_provider_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Show weather for a city.
    Show {
        city: String,

        country: String,

        #[command(flatten)]
        opts: QueryOpts,
    },

    /// Show weather at a coordinate pair.
    ShowAt {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,

        #[arg(allow_negative_numbers = true)]
        longitude: f64,

        #[command(flatten)]
        opts: QueryOpts,
    },

    /// Inspect or invalidate cached weather.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Debug, clap::Args)]
pub struct QueryOpts {
    /// Day to look up (YYYY-MM-DD); defaults to today.
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// Ask for hourly detail.
    #[arg(long)]
    hourly: bool,

    /// Identifier the request is rate limited under. Quotas persist between runs.
    #[arg(long, default_value = "cli")]
    client: String,
}

impl QueryOpts {
    fn request_for(&self, location: Location) -> weather_core::Result<WeatherRequest> {
        let date = self.date.unwrap_or_else(|| Utc::now().date_naive());
        WeatherRequest::new(location, date, self.hourly)
    }
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Print the entry stored under a key.
    Get { key: String },

    /// Drop the entry stored under a key.
    Invalidate { key: String },

    /// Drop every cached entry.
    Clear,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("expected a date like 2026-10-19: {e}"))
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Show {
                city,
                country,
                opts,
            } => show(Location::from_city(&city, &country)?, &opts).await,
            Command::ShowAt {
                latitude,
                longitude,
                opts,
            } => show(Location::from_coordinates(latitude, longitude)?, &opts).await,
            Command::Cache { action } => run_cache(action).await,
        }
    }
}

fn configure(provider: &str) -> Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if config.is_provider_configured(id) {
        let replace = Confirm::new(&format!("An API key for '{id}' exists. Replace it?"))
            .with_default(false)
            .prompt()?;
        if !replace {
            println!("Keeping the existing key for '{id}'.");
            return Ok(());
        }
    }

    let api_key = Password::new(&format!("API key for {id}:"))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;
    let api_key = api_key.trim().to_owned();
    anyhow::ensure!(!api_key.is_empty(), "API key must not be empty");

    config.upsert_provider_api_key(id, api_key);

    let is_default = config.default_provider.as_deref() == Some(id.as_str());
    if !is_default
        && Confirm::new(&format!("Make '{id}' the default provider?"))
            .with_default(true)
            .prompt()?
    {
        config.set_default_provider(id);
    }

    config.save()?;
    println!(
        "Saved configuration to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

/// Input is validated before the quota is touched, so malformed requests cost nothing.
async fn show(location: Location, opts: &QueryOpts) -> Result<()> {
    let request = opts.request_for(location)?;
    let service = build_service()?;

    admit(&service, &opts.client).await?;
    let response = service.retrieve(&request).await?;
    print_response(&response, service.provider_name());
    Ok(())
}

fn build_service() -> Result<WeatherService> {
    let config = Config::load()?;
    let provider = default_provider_from_config(&config)?;

    let cache = CacheCoordinator::new(
        Arc::new(FileCache::new(FileCache::default_dir()?)),
        config.cache.default_ttl(),
    )?;
    let quota = RateLimitConfig::new(config.rate_limit.max_requests, config.rate_limit.window())?;
    let limiter = FileRateLimiter::new(FileRateLimiter::default_path()?, quota);

    Ok(WeatherService::new(
        WeatherOrchestrator::new(cache, Arc::from(provider)),
        RateLimitCoordinator::with_config(Arc::new(limiter), quota),
    ))
}

async fn admit(service: &WeatherService, client: &str) -> Result<()> {
    let allowed = service.consume_rate_limit(client).await?;
    anyhow::ensure!(
        allowed,
        "Rate limit exceeded for client '{client}' ({} requests per window)",
        service.max_requests()
    );
    Ok(())
}

async fn run_cache(action: CacheAction) -> Result<()> {
    let config = Config::load()?;
    let port = Arc::new(FileCache::new(FileCache::default_dir()?));
    let cache = CacheCoordinator::new(port, config.cache.default_ttl())?;

    match action {
        CacheAction::Get { key } => {
            let key = CacheKey::parse(&key)?;
            match cache.get(&key).await? {
                Some(data) => print_data(&data),
                None => println!("No cached entry for {key}"),
            }
        }
        CacheAction::Invalidate { key } => {
            let key = CacheKey::parse(&key)?;
            cache.evict(&key).await?;
            println!("Invalidated {key}");
        }
        CacheAction::Clear => {
            cache.clear().await.context("Failed to clear the weather cache")?;
            println!("Cache cleared");
        }
    }
    Ok(())
}

fn print_response(response: &WeatherResponse, provider: &str) {
    print_data(response.data());
    let origin = if response.cached() { "cache" } else { provider };
    println!("Source:      {origin}");
}

fn print_data(data: &WeatherData) {
    println!("Location:    {}", data.location().display_name());
    println!("Observed:    {}", data.timestamp().format("%Y-%m-%d %H:%M UTC"));
    println!("Conditions:  {}", data.description());
    println!("Temperature: {:.1} °C", data.temperature_c());
    println!("Humidity:    {}%", data.humidity_pct());
}
