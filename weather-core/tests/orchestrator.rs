//! Cache-aside behaviour of the orchestrator and the service facade, using in-test doubles.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use weather_core::{
    CacheCoordinator, CachePort, Config, Location, MemoryCache, TokenBucketLimiter,
    WeatherData, WeatherOrchestrator, WeatherProvider, WeatherRequest, WeatherService,
    cache::derive_key,
};

#[derive(Debug)]
struct StubProvider {
    fetches: AtomicUsize,
    available: AtomicBool,
    fail: bool,
}

impl StubProvider {
    fn healthy() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::healthy()
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherProvider for StubProvider {
    async fn fetch(&self, request: &WeatherRequest) -> anyhow::Result<WeatherData> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("upstream exploded");
        }
        Ok(WeatherData::new(
            18.0,
            60,
            "Clear",
            request.location().clone(),
            Utc::now(),
        )?)
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn provider_name(&self) -> &str {
        "stub"
    }
}

/// Memory cache that counts writes.
#[derive(Debug, Default)]
struct CountingCache {
    inner: MemoryCache,
    writes: AtomicUsize,
}

#[async_trait]
impl CachePort for CountingCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<WeatherData>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &WeatherData, ttl: StdDuration) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.exists(key).await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.inner.clear().await
    }
}

#[derive(Debug)]
struct BrokenCache;

#[async_trait]
impl CachePort for BrokenCache {
    async fn get(&self, _key: &str) -> anyhow::Result<Option<WeatherData>> {
        anyhow::bail!("cache connection reset")
    }

    async fn put(&self, _key: &str, _value: &WeatherData, _ttl: StdDuration) -> anyhow::Result<()> {
        anyhow::bail!("cache connection reset")
    }

    async fn delete(&self, _key: &str) -> anyhow::Result<()> {
        anyhow::bail!("cache connection reset")
    }

    async fn exists(&self, _key: &str) -> anyhow::Result<bool> {
        anyhow::bail!("cache connection reset")
    }

    async fn clear(&self) -> anyhow::Result<()> {
        anyhow::bail!("cache connection reset")
    }
}

/// Cache that reads fine but refuses writes.
#[derive(Debug, Default)]
struct ReadOnlyCache {
    inner: MemoryCache,
}

#[async_trait]
impl CachePort for ReadOnlyCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<WeatherData>> {
        self.inner.get(key).await
    }

    async fn put(&self, _key: &str, _value: &WeatherData, _ttl: StdDuration) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.exists(key).await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.inner.clear().await
    }
}

fn paris_request() -> WeatherRequest {
    let location = Location::from_city("Paris", "France").unwrap();
    WeatherRequest::new(location, Utc::now().date_naive(), false).unwrap()
}

fn orchestrator(
    cache: Arc<dyn CachePort>,
    provider: Arc<dyn WeatherProvider>,
) -> WeatherOrchestrator {
    WeatherOrchestrator::new(CacheCoordinator::with_default_ttl(cache), provider)
}

#[tokio::test]
async fn paris_cold_then_warm() {
    let cache = Arc::new(CountingCache::default());
    let provider = Arc::new(StubProvider::healthy());
    let orch = orchestrator(cache.clone(), provider.clone());
    let today = Utc::now().date_naive();

    let first = orch.get_weather("Paris", "France", today, false).await.unwrap();
    assert!(!first.cached());
    assert_eq!(first.data().temperature_c(), 18.0);
    assert_eq!(first.data().humidity_pct(), 60);
    assert_eq!(first.data().description(), "Clear");
    assert_eq!(provider.fetches(), 1);
    assert_eq!(cache.writes.load(Ordering::SeqCst), 1);

    let second = orch.get_weather("Paris", "France", today, false).await.unwrap();
    assert!(second.cached());
    assert_eq!(second.data(), first.data());
    assert_eq!(provider.fetches(), 1);
    assert_eq!(cache.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn warm_cache_never_touches_provider() {
    let cache = Arc::new(MemoryCache::new());
    let request = paris_request();
    let data = WeatherData::new(
        12.0,
        70,
        "Cloudy",
        request.location().clone(),
        Utc::now(),
    )
    .unwrap();
    cache
        .put(derive_key(&request).as_str(), &data, StdDuration::from_secs(60))
        .await
        .unwrap();

    let provider = Arc::new(StubProvider::failing());
    let orch = orchestrator(cache, provider.clone());

    let response = orch.retrieve(&request).await.unwrap();
    assert!(response.cached());
    assert_eq!(response.data(), &data);
    assert_eq!(provider.fetches(), 0);
}

#[tokio::test]
async fn unavailable_provider_fails_fast() {
    let cache = Arc::new(CountingCache::default());
    let provider = Arc::new(StubProvider::healthy());
    provider.available.store(false, Ordering::SeqCst);
    let orch = orchestrator(cache.clone(), provider.clone());

    let err = orch.retrieve(&paris_request()).await.unwrap_err();
    assert!(err.is_service_unavailable());
    assert!(err.to_string().contains("stub"));
    assert_eq!(provider.fetches(), 0);
    assert_eq!(cache.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_fetch_is_wrapped_and_not_cached() {
    let cache = Arc::new(CountingCache::default());
    let provider = Arc::new(StubProvider::failing());
    let orch = orchestrator(cache.clone(), provider.clone());
    let request = paris_request();

    let err = orch.retrieve(&request).await.unwrap_err();
    assert!(err.is_operation());
    assert_eq!(provider.fetches(), 1);
    assert_eq!(cache.writes.load(Ordering::SeqCst), 0);
    assert!(!cache.exists(derive_key(&request).as_str()).await.unwrap());
}

#[tokio::test]
async fn broken_cache_is_not_a_miss() {
    let provider = Arc::new(StubProvider::healthy());
    let orch = orchestrator(Arc::new(BrokenCache), provider.clone());

    let err = orch.retrieve(&paris_request()).await.unwrap_err();
    assert!(err.is_operation());
    assert_eq!(provider.fetches(), 0);
}

#[tokio::test]
async fn failed_write_back_is_reported() {
    let provider = Arc::new(StubProvider::healthy());
    let orch = orchestrator(Arc::new(ReadOnlyCache::default()), provider.clone());

    let err = orch.retrieve(&paris_request()).await.unwrap_err();
    assert!(err.is_operation());
    assert!(err.to_string().contains("cache write"));
    assert_eq!(provider.fetches(), 1);
}

#[tokio::test]
async fn invalid_input_never_reaches_ports() {
    let cache = Arc::new(CountingCache::default());
    let provider = Arc::new(StubProvider::healthy());
    let orch = orchestrator(cache.clone(), provider.clone());
    let today = Utc::now().date_naive();
    let long = "x".repeat(300);

    for city in ["<script>", "Lon;don", "", long.as_str()] {
        let err = orch.get_weather(city, "UK", today, false).await.unwrap_err();
        assert!(err.is_validation(), "{city:?} should be rejected");
    }

    let err = orch.get_weather_at(91.0, 0.5, today, false).await.unwrap_err();
    assert!(err.is_validation());

    let err = orch
        .get_weather("Paris", "France", today + Duration::days(40), false)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    assert_eq!(provider.fetches(), 0);
    assert_eq!(cache.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn coordinates_and_hourly_flag_are_cached_separately() {
    let provider = Arc::new(StubProvider::healthy());
    let orch = orchestrator(Arc::new(MemoryCache::new()), provider.clone());
    let today = Utc::now().date_naive();

    assert!(!orch.get_weather_at(90.0, 0.0, today, false).await.unwrap().cached());
    assert!(!orch.get_weather_at(90.0, 0.0, today, true).await.unwrap().cached());
    assert!(orch.get_weather_at(90.0, 0.0, today, true).await.unwrap().cached());
    assert_eq!(provider.fetches(), 2);
}

#[tokio::test]
async fn concurrent_misses_are_tolerated() {
    let cache = Arc::new(CountingCache::default());
    let provider = Arc::new(StubProvider::healthy());
    let orch = orchestrator(cache.clone(), provider.clone());
    let request = paris_request();

    let (a, b) = tokio::join!(orch.retrieve(&request), orch.retrieve(&request));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.data().description(), b.data().description());

    let fetches = provider.fetches();
    assert!((1..=2).contains(&fetches));
    assert_eq!(cache.writes.load(Ordering::SeqCst), fetches);
    assert!(orch.retrieve(&request).await.unwrap().cached());
}

fn service(max_requests: u32) -> (WeatherService, Arc<StubProvider>) {
    let mut config = Config::default();
    config.rate_limit.max_requests = max_requests;
    let provider = Arc::new(StubProvider::healthy());
    let limiter = Arc::new(TokenBucketLimiter::new(
        weather_core::RateLimitConfig::new(max_requests, config.rate_limit.window()).unwrap(),
    ));
    let service =
        WeatherService::from_config(&config, provider.clone(), Arc::new(MemoryCache::new()), limiter)
            .unwrap();
    (service, provider)
}

#[tokio::test]
async fn service_rate_limit_scenario() {
    let (service, _) = service(3);

    for _ in 0..3 {
        assert!(service.consume_rate_limit("abc").await.unwrap());
    }
    assert!(!service.consume_rate_limit("abc").await.unwrap());
    assert!(!service.check_rate_limit("abc").await.unwrap());
    assert_eq!(service.remaining_tokens("abc").await.unwrap(), 0);

    service.reset_rate_limit("abc").await.unwrap();
    assert_eq!(service.remaining_tokens("abc").await.unwrap(), 3);
    assert!(service.consume_rate_limit("abc").await.unwrap());
}

#[tokio::test]
async fn service_cache_operations() {
    let (service, provider) = service(10);
    let today = Utc::now().date_naive();

    let fetched = service.get_weather("Paris", "France", today, false).await.unwrap();
    let key = derive_key(&paris_request());

    let cached = service.retrieve_cached(key.as_str()).await.unwrap();
    assert_eq!(cached.as_ref(), Some(fetched.data()));

    service.invalidate(key.as_str()).await.unwrap();
    assert_eq!(service.retrieve_cached(key.as_str()).await.unwrap(), None);

    service
        .cache_weather("manual:entry", fetched.data(), Some(Duration::seconds(60)))
        .await
        .unwrap();
    service.cache_weather("manual:default-ttl", fetched.data(), None).await.unwrap();
    assert!(service.retrieve_cached("manual:entry").await.unwrap().is_some());

    let err = service
        .cache_weather("manual:negative", fetched.data(), Some(Duration::seconds(-1)))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    service.clear_all().await.unwrap();
    assert_eq!(service.retrieve_cached("manual:entry").await.unwrap(), None);
    assert_eq!(service.retrieve_cached("manual:default-ttl").await.unwrap(), None);

    assert!(service.retrieve_cached("../etc/passwd").await.unwrap_err().is_validation());
    assert!(service.invalidate("a key").await.unwrap_err().is_validation());
    assert_eq!(provider.fetches(), 1);
}

#[test]
fn service_rejects_bad_configuration() {
    let mut config = Config::default();
    config.cache.default_ttl_secs = 0;

    let err = WeatherService::from_config(
        &config,
        Arc::new(StubProvider::healthy()),
        Arc::new(MemoryCache::new()),
        Arc::new(TokenBucketLimiter::new(weather_core::RateLimitConfig::default())),
    )
    .unwrap_err();
    assert!(err.is_validation());

    let mut config = Config::default();
    config.rate_limit.max_requests = 0;
    let err = WeatherService::from_config(
        &config,
        Arc::new(StubProvider::healthy()),
        Arc::new(MemoryCache::new()),
        Arc::new(TokenBucketLimiter::new(weather_core::RateLimitConfig::default())),
    )
    .unwrap_err();
    assert!(err.is_validation());
}
