//! Per-user, per-provider read-through cache for third-party API responses.
//!
//! Entries are plain TTL entries: there is no eviction beyond expiry and no
//! negative caching. Two callers missing at the same moment both reach the
//! upstream API; the second write simply overwrites the first.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{LifeHubError, Result};
use crate::storage::CacheStore;

/// A third-party data source behind the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Weather,
    Calendar,
    Wearable,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Weather => "weather",
            Provider::Calendar => "calendar",
            Provider::Wearable => "wearable",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub user_id: String,
    pub provider: Provider,
    pub key: String,
}

impl CacheKey {
    pub fn new(user_id: &str, provider: Provider, key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            provider,
            key: key.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.provider, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Expiry is a hard boundary: at `expires_at` the entry is already stale.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A fetched value and whether it came from the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cached<T> {
    pub data: T,
    pub cached: bool,
}

impl<T> Cached<T> {
    pub fn fresh(data: T) -> Self {
        Self {
            data,
            cached: false,
        }
    }

    pub fn hit(data: T) -> Self {
        Self { data, cached: true }
    }
}

pub struct ExternalCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl ExternalCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Return the cached value if present and not expired.
    ///
    /// Store failures are logged and reported as a miss so a broken cache
    /// never blocks the upstream path.
    pub async fn get_cached(
        &self,
        user_id: &str,
        provider: Provider,
        cache_key: &str,
    ) -> Option<serde_json::Value> {
        let key = CacheKey::new(user_id, provider, cache_key);
        let entry = match self.store.get(&key).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        if entry.is_valid_at(self.clock.now()) {
            debug!("Cache hit for {}", key);
            Some(entry.value)
        } else {
            debug!("Cache entry for {} expired at {}", key, entry.expires_at);
            None
        }
    }

    /// Store or overwrite an entry expiring `ttl_minutes` from now.
    pub async fn set_cached(
        &self,
        user_id: &str,
        provider: Provider,
        cache_key: &str,
        value: serde_json::Value,
        ttl_minutes: i64,
    ) -> Result<()> {
        if ttl_minutes <= 0 {
            return Err(LifeHubError::Validation(format!(
                "Cache TTL must be positive, got {} minutes",
                ttl_minutes
            )));
        }

        let now = self.clock.now();
        let expires_at = Duration::try_minutes(ttl_minutes)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                LifeHubError::Validation(format!(
                    "Cache TTL of {} minutes is out of range",
                    ttl_minutes
                ))
            })?;
        let entry = CacheEntry {
            key: CacheKey::new(user_id, provider, cache_key),
            value,
            created_at: now,
            expires_at,
        };
        debug!("Caching {} until {}", entry.key, entry.expires_at);
        self.store.upsert(entry).await
    }

    /// Delete every expired entry. Reads enforce expiry on their own, so this
    /// is housekeeping only.
    pub async fn purge_expired(&self) -> Result<usize> {
        let removed = self.store.delete_expired(self.clock.now()).await?;
        if removed > 0 {
            info!("Purged {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// The fetch protocol shared by every integration: serve a valid entry,
    /// otherwise call `fetch`, cache its result and return it.
    ///
    /// Failed fetches are not cached. A failed cache write is logged and the
    /// fresh value is still returned.
    pub async fn read_through<T, F, Fut>(
        &self,
        user_id: &str,
        provider: Provider,
        cache_key: &str,
        ttl_minutes: i64,
        fetch: F,
    ) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get_cached(user_id, provider, cache_key).await {
            match serde_json::from_value::<T>(value) {
                Ok(data) => return Ok(Cached::hit(data)),
                Err(e) => warn!(
                    "Discarding unreadable {} cache entry {}: {}",
                    provider, cache_key, e
                ),
            }
        }

        debug!("Cache miss for {} {}, fetching", provider, cache_key);
        let data = fetch().await?;

        let value = serde_json::to_value(&data)?;
        if let Err(e) = self
            .set_cached(user_id, provider, cache_key, value, ttl_minutes)
            .await
        {
            warn!("Failed to cache {} {}: {}", provider, cache_key, e);
        }

        Ok(Cached::fresh(data))
    }
}
