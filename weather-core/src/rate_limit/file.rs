//! Token buckets persisted to a JSON file, so a quota outlives a single process.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    cache::file::write_atomic,
    rate_limit::{RateLimitConfig, RateLimiterPort, token_bucket::refill_tokens},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredBucket {
    tokens: f64,
    updated_at: DateTime<Utc>,
}

type Buckets = HashMap<String, StoredBucket>;

/// [`RateLimiterPort`] backed by one JSON file, used by the CLI.
///
/// Calls within a process are serialized, so `try_consume` is atomic there. Processes sharing
/// the file race on the final write and the last one wins.
///
/// A bucket that has refilled completely reads the same as an unknown client, so it is
/// dropped from the file on the next write.
#[derive(Debug)]
pub struct FileRateLimiter {
    path: PathBuf,
    capacity: f64,
    refill_per_sec: f64,
    lock: Mutex<()>,
}

impl FileRateLimiter {
    pub fn new(path: impl Into<PathBuf>, config: RateLimitConfig) -> Self {
        let capacity = f64::from(config.max_requests());
        Self {
            path: path.into(),
            capacity,
            refill_per_sec: capacity / config.window().as_secs_f64(),
            lock: Mutex::new(()),
        }
    }

    /// Platform state file for the weather CLI.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-task", "weather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform data directory"))?;

        Ok(dirs.data_local_dir().join("rate_limit.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tokens_at(&self, bucket: Option<&StoredBucket>, now: DateTime<Utc>) -> f64 {
        match bucket {
            Some(bucket) => {
                // a clock that went backwards refills nothing
                let elapsed = (now - bucket.updated_at)
                    .to_std()
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                refill_tokens(bucket.tokens, elapsed, self.capacity, self.refill_per_sec)
            }
            None => self.capacity,
        }
    }

    async fn load(&self) -> Result<Buckets> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Buckets::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read rate limit file: {}", self.path.display())
                });
            }
        };

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse rate limit file: {}", self.path.display()))
    }

    async fn store(&self, mut buckets: Buckets, now: DateTime<Utc>) -> Result<()> {
        buckets.retain(|_, bucket| self.tokens_at(Some(&*bucket), now) < self.capacity);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create rate limit directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string(&buckets).context("Failed to serialize rate limits")?;
        write_atomic(&self.path, json).await
    }
}

#[async_trait]
impl RateLimiterPort for FileRateLimiter {
    async fn try_consume(&self, client_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        let mut buckets = self.load().await?;

        let tokens = self.tokens_at(buckets.get(client_id), now);
        if tokens < 1.0 {
            return Ok(false);
        }

        buckets.insert(
            client_id.to_owned(),
            StoredBucket {
                tokens: tokens - 1.0,
                updated_at: now,
            },
        );
        self.store(buckets, now).await?;
        Ok(true)
    }

    async fn available_tokens(&self, client_id: &str) -> Result<u32> {
        let _guard = self.lock.lock().await;
        let buckets = self.load().await?;
        Ok(self.tokens_at(buckets.get(client_id), Utc::now()).floor() as u32)
    }

    async fn reset(&self, client_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut buckets = self.load().await?;
        if buckets.remove(client_id).is_some() {
            self.store(buckets, Utc::now()).await?;
        }
        Ok(())
    }
}
