//! Daily sleep, readiness and activity from the wearable provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{Cached, ExternalCache, Provider};
use crate::error::{LifeHubError, Result};
use crate::integrations::http::check_status;
use crate::integrations::oauth::TokenManager;

// ============================================================================
// Provider payload
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OuraCollection<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OuraDailyScore {
    pub day: NaiveDate,
    pub score: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OuraDailyActivity {
    pub day: NaiveDate,
    pub score: Option<u8>,
    pub steps: Option<u32>,
    pub active_calories: Option<u32>,
}

// ============================================================================
// Normalized shape
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricsSummary {
    pub date: NaiveDate,
    pub sleep_score: Option<u8>,
    pub readiness_score: Option<u8>,
    pub activity_score: Option<u8>,
    pub steps: Option<u32>,
    pub active_calories: Option<u32>,
}

impl BiometricsSummary {
    /// Pick the record for `date` out of each collection. A collection with
    /// nothing for that day leaves its fields empty.
    pub fn from_provider(
        date: NaiveDate,
        sleep: &[OuraDailyScore],
        readiness: &[OuraDailyScore],
        activity: &[OuraDailyActivity],
    ) -> Self {
        let score_for = |records: &[OuraDailyScore]| {
            records
                .iter()
                .find(|r| r.day == date)
                .and_then(|r| r.score)
        };
        let activity = activity.iter().find(|r| r.day == date);

        Self {
            date,
            sleep_score: score_for(sleep),
            readiness_score: score_for(readiness),
            activity_score: activity.and_then(|a| a.score),
            steps: activity.and_then(|a| a.steps),
            active_calories: activity.and_then(|a| a.active_calories),
        }
    }
}

pub fn biometrics_cache_key(date: NaiveDate) -> String {
    format!("biometrics:{}", date.format("%Y-%m-%d"))
}

// ============================================================================
// Upstream API
// ============================================================================

#[async_trait]
pub trait WearableApi: Send + Sync {
    async fn daily_sleep(&self, access_token: &str, date: NaiveDate) -> Result<Vec<OuraDailyScore>>;

    async fn daily_readiness(
        &self,
        access_token: &str,
        date: NaiveDate,
    ) -> Result<Vec<OuraDailyScore>>;

    async fn daily_activity(
        &self,
        access_token: &str,
        date: NaiveDate,
    ) -> Result<Vec<OuraDailyActivity>>;
}

pub struct HttpWearableApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWearableApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn collection<T: DeserializeOwned>(
        &self,
        access_token: &str,
        name: &str,
        date: NaiveDate,
    ) -> Result<Vec<T>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), name);
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .query(&[
                ("start_date", date.to_string()),
                ("end_date", (date + Duration::days(1)).to_string()),
            ])
            .send()
            .await?;
        let response = check_status(Provider::Wearable.as_str(), response).await?;
        let body: OuraCollection<T> = response.json().await?;
        Ok(body.data)
    }
}

#[async_trait]
impl WearableApi for HttpWearableApi {
    async fn daily_sleep(&self, access_token: &str, date: NaiveDate) -> Result<Vec<OuraDailyScore>> {
        self.collection(access_token, "daily_sleep", date).await
    }

    async fn daily_readiness(
        &self,
        access_token: &str,
        date: NaiveDate,
    ) -> Result<Vec<OuraDailyScore>> {
        self.collection(access_token, "daily_readiness", date).await
    }

    async fn daily_activity(
        &self,
        access_token: &str,
        date: NaiveDate,
    ) -> Result<Vec<OuraDailyActivity>> {
        self.collection(access_token, "daily_activity", date).await
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct WearableService {
    api: Arc<dyn WearableApi>,
    tokens: TokenManager,
    cache: Arc<ExternalCache>,
    ttl_minutes: i64,
}

impl WearableService {
    pub fn new(
        api: Arc<dyn WearableApi>,
        tokens: TokenManager,
        cache: Arc<ExternalCache>,
        ttl_minutes: i64,
    ) -> Self {
        Self {
            api,
            tokens,
            cache,
            ttl_minutes,
        }
    }

    /// Summary for one day. The three collections are fetched concurrently;
    /// any one of them failing fails the whole fetch and nothing is cached.
    pub async fn summary_for_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Cached<BiometricsSummary>> {
        let key = biometrics_cache_key(date);

        self.cache
            .read_through(user_id, Provider::Wearable, &key, self.ttl_minutes, || async {
                let access_token = self.tokens.access_token(user_id).await?;
                debug!("Fetching biometrics for {}", date);
                let (sleep, readiness, activity) = futures::try_join!(
                    self.api.daily_sleep(&access_token, date),
                    self.api.daily_readiness(&access_token, date),
                    self.api.daily_activity(&access_token, date),
                )
                .map_err(|e| self.tokens.rejected(e))?;
                Ok::<_, LifeHubError>(BiometricsSummary::from_provider(
                    date, &sleep, &readiness, &activity,
                ))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::integrations::oauth::tests::MockRefresher;
    use crate::integrations::OAuthToken;
    use crate::storage::{MemoryCacheStore, MemoryTokenStore, TokenStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    #[derive(Default)]
    struct FakeWearableApi {
        calls: AtomicUsize,
        /// Status the readiness collection fails with.
        readiness_status: Option<u16>,
    }

    #[async_trait]
    impl WearableApi for FakeWearableApi {
        async fn daily_sleep(&self, _t: &str, date: NaiveDate) -> Result<Vec<OuraDailyScore>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                OuraDailyScore {
                    day: date - Duration::days(1),
                    score: Some(60),
                },
                OuraDailyScore {
                    day: date,
                    score: Some(82),
                },
            ])
        }

        async fn daily_readiness(&self, _t: &str, _date: NaiveDate) -> Result<Vec<OuraDailyScore>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.readiness_status {
                return Err(LifeHubError::Upstream {
                    provider: "wearable".into(),
                    status,
                    message: "request failed".into(),
                });
            }
            Ok(Vec::new())
        }

        async fn daily_activity(
            &self,
            _t: &str,
            date: NaiveDate,
        ) -> Result<Vec<OuraDailyActivity>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![OuraDailyActivity {
                day: date,
                score: Some(74),
                steps: Some(8421),
                active_calories: Some(512),
            }])
        }
    }

    async fn service(api: Arc<FakeWearableApi>) -> (WearableService, Arc<MemoryCacheStore>) {
        let clock = Arc::new(ManualClock::default());
        let tokens = Arc::new(MemoryTokenStore::new());
        tokens
            .save_token(
                "u1",
                Provider::Wearable,
                &OAuthToken {
                    access_token: "oura-access".into(),
                    refresh_token: None,
                    expires_at: clock.now() + Duration::days(1),
                    scope: None,
                },
            )
            .await
            .unwrap();
        let manager = TokenManager::new(
            Provider::Wearable,
            tokens,
            Arc::new(MockRefresher::default()),
            clock.clone(),
            60,
        );
        let store = Arc::new(MemoryCacheStore::new());
        let cache = Arc::new(ExternalCache::new(store.clone(), clock));
        (WearableService::new(api, manager, cache, 30), store)
    }

    #[test]
    fn test_collection_without_data_field() {
        let body: OuraCollection<OuraDailyScore> = serde_json::from_str("{}").unwrap();
        assert!(body.data.is_empty());
    }

    #[tokio::test]
    async fn test_summary_picks_the_requested_day() {
        let api = Arc::new(FakeWearableApi::default());
        let (service, _) = service(api.clone()).await;

        let summary = service.summary_for_day("u1", day()).await.unwrap();
        assert!(!summary.cached);
        assert_eq!(
            summary.data,
            BiometricsSummary {
                date: day(),
                sleep_score: Some(82),
                readiness_score: None,
                activity_score: Some(74),
                steps: Some(8421),
                active_calories: Some(512),
            }
        );

        let again = service.summary_for_day("u1", day()).await.unwrap();
        assert!(again.cached);
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_one_failing_collection_fails_the_fetch() {
        let api = Arc::new(FakeWearableApi {
            readiness_status: Some(503),
            ..Default::default()
        });
        let (service, store) = service(api).await;

        let err = service.summary_for_day("u1", day()).await.unwrap_err();
        assert!(matches!(err, LifeHubError::Upstream { status: 503, .. }));
        assert!(!err.needs_reconnect());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_revoked_token_asks_to_reconnect() {
        let api = Arc::new(FakeWearableApi {
            readiness_status: Some(401),
            ..Default::default()
        });
        let (service, store) = service(api).await;

        let err = service.summary_for_day("u1", day()).await.unwrap_err();
        assert!(matches!(err, LifeHubError::Unauthorized(ref m) if m.contains("please reconnect")));
        assert_eq!(store.len().await, 0);
    }
}
