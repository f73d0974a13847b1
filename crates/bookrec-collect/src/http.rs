use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{CollectError, Result};

/// Retry-After fallback when a 429 carries no usable header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// Sequential HTTP client: a politeness delay between requests and bounded
/// retries on 429 and transport errors.
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    max_retries: u32,
}

impl RateLimitedClient {
    pub fn new(min_interval: Duration, timeout: Duration, max_retries: u32, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            max_retries,
        })
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            debug!(url, attempt, "GET");
            match self.client.get(url).send().await {
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.trim().parse::<u64>().ok())
                        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                    if attempt >= self.max_retries {
                        return Err(CollectError::RateLimit(host_of(url), wait));
                    }
                    warn!(url, wait, "rate limited, backing off");
                    sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    let snippet: String = body.chars().take(200).collect();
                    return Err(CollectError::ApiError(
                        url.to_string(),
                        format!("HTTP {status}: {snippet}"),
                    ));
                }
                Ok(r) => return r.text().await.map_err(CollectError::Http),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(CollectError::Http(e));
                    }
                    let backoff = 2u64.pow(attempt);
                    warn!(url, error = %e, backoff, "request failed, retrying");
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get(url).await?;
        serde_json::from_str(&text).map_err(|e| CollectError::Parse(e.to_string()))
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToOwned::to_owned))
        .unwrap_or_else(|| url.to_string())
}

// ─── DiskCache ────────────────────────────────────────────────────────────────

/// JSON response cache with a time-to-live, one file per key.
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

fn cache_key_to_path(dir: &Path, key: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    dir.join(format!("{hash:016x}.json"))
}

#[derive(Serialize, serde::Deserialize)]
struct CacheEntry<T> {
    stored_at: DateTime<Utc>,
    value: T,
}

impl DiskCache {
    /// Cache under `root/namespace`. An unwritable directory only disables
    /// caching.
    pub fn new(root: &Path, namespace: &str, ttl: Duration) -> Self {
        let dir = root.join(namespace);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "cache directory unavailable");
        }
        Self { dir, ttl }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = cache_key_to_path(&self.dir, key);
        let data = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry<T> = serde_json::from_slice(&data).ok()?;
        let ttl = TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX);
        if Utc::now().signed_duration_since(entry.stored_at) > ttl {
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }
        Some(entry.value)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let path = cache_key_to_path(&self.dir, key);
        let entry = CacheEntry {
            stored_at: Utc::now(),
            value,
        };
        if let Ok(data) = serde_json::to_vec(&entry) {
            let _ = tokio::fs::write(&path, data).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn client(max_retries: u32) -> RateLimitedClient {
        RateLimitedClient::new(
            Duration::from_millis(1),
            Duration::from_secs(5),
            max_retries,
            "bookrec-test",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn cache_set_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), "roundtrip", Duration::from_secs(60));
        cache.set("key1", &"hello world").await;
        let val: Option<String> = cache.get("key1").await;
        assert_eq!(val, Some("hello world".to_string()));
        assert_eq!(cache.get::<String>("other").await, None);
    }

    #[tokio::test]
    async fn cache_expired_returns_none() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), "expired", Duration::from_secs(0));
        cache.set("key_exp", &42u32).await;
        sleep(Duration::from_millis(1100)).await;
        let val: Option<u32> = cache.get("key_exp").await;
        assert_eq!(val, None);
    }

    #[tokio::test]
    async fn cache_entry_older_than_ttl_is_dropped() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path(), "stale", Duration::from_secs(3600));
        let path = cache_key_to_path(&dir.path().join("stale"), "old");
        let entry = CacheEntry {
            stored_at: Utc::now() - TimeDelta::hours(2),
            value: "stale",
        };
        std::fs::write(&path, serde_json::to_vec(&entry).unwrap()).unwrap();

        assert_eq!(cache.get::<String>("old").await, None);
        assert!(!path.exists());

        cache.set("fresh", &"kept").await;
        assert_eq!(cache.get::<String>("fresh").await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn get_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let body = client(0).get(&format!("{}/ok", server.url())).await.unwrap();
        assert_eq!(body, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_retries_then_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(2)
            .create_async()
            .await;

        let err = client(1)
            .get(&format!("{}/busy", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::RateLimit(_, 0)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("not here")
            .create_async()
            .await;

        let err = client(2)
            .get(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::ApiError(_, ref msg) if msg.contains("404")));
    }
}
