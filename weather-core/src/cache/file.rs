//! On-disk cache: one JSON document per key.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{cache::CachePort, model::WeatherData};

const EXTENSION: &str = "json";

/// Suffix of in-flight writes; never matches [`EXTENSION`], so `clear` and readers skip them.
const TMP_EXTENSION: &str = "tmp";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    expires_at: DateTime<Utc>,
    value: WeatherData,
}

/// [`CachePort`] that survives process restarts, used by the CLI.
///
/// File names are the hex SHA-256 of the key, so every key the gateway accepts maps to a
/// fixed-length name. The key itself is stored in the document and checked on read.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform cache directory for the weather CLI.
    pub fn default_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-task", "weather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform cache directory"))?;

        Ok(dirs.cache_dir().join("responses"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the entry for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{digest:x}.{EXTENSION}"))
    }

    async fn read_entry(&self, key: &str) -> Result<Option<StoredEntry>> {
        let path = self.entry_path(key);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read cache file: {}", path.display()));
            }
        };

        let entry: StoredEntry = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;

        if entry.key != key {
            tracing::warn!(key, stored = %entry.key, "cache file holds a different key");
            return Ok(None);
        }
        if entry.expires_at <= Utc::now() {
            remove_file(&path).await?;
            return Ok(None);
        }

        Ok(Some(entry))
    }
}

/// Replace `path` with `contents` through a temp file unique to this write, so concurrent
/// writers never share a temp file and readers never observe a half-written document.
pub(crate) async fn write_atomic(path: &Path, contents: String) -> Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?
        .to_string_lossy();
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_file_name(format!(
        "{name}.{}.{seq}.{TMP_EXTENSION}",
        std::process::id()
    ));

    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write file: {}", tmp.display()))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        // best effort; the rename error is the one worth reporting
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e)
            .with_context(|| format!("Failed to move file into place: {}", path.display()));
    }
    Ok(())
}

async fn remove_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove cache file: {}", path.display())),
    }
}

#[async_trait]
impl CachePort for FileCache {
    async fn get(&self, key: &str) -> Result<Option<WeatherData>> {
        Ok(self.read_entry(key).await?.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: &WeatherData, ttl: Duration) -> Result<()> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| anyhow!("TTL of {}s is out of range", ttl.as_secs()))?;

        tokio::fs::create_dir_all(&self.dir).await.with_context(|| {
            format!("Failed to create cache directory: {}", self.dir.display())
        })?;

        let entry = StoredEntry {
            key: key.to_owned(),
            expires_at,
            value: value.clone(),
        };
        let json = serde_json::to_string(&entry).context("Failed to serialize cache entry")?;

        write_atomic(&self.entry_path(key), json).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        remove_file(&self.entry_path(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.read_entry(key).await?.is_some())
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to list cache directory: {}", self.dir.display())
                });
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to list cache directory")?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                remove_file(&path).await?;
            }
        }

        Ok(())
    }
}
