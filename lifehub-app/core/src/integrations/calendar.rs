//! One day of calendar events through the user's connected calendar account.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{Cached, ExternalCache, Provider};
use crate::error::{LifeHubError, Result};
use crate::integrations::http::check_status;
use crate::integrations::oauth::TokenManager;

const UNTITLED_EVENT: &str = "(No title)";

// ============================================================================
// Provider payload
// ============================================================================

/// Either a timed (`dateTime`) or an all-day (`date`) boundary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GEventTime {
    pub date_time: Option<DateTime<chrono::FixedOffset>>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GEvent {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start: GEventTime,
    #[serde(default)]
    pub end: GEventTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GEventList {
    #[serde(default)]
    pub items: Vec<GEvent>,
}

// ============================================================================
// Normalized shape
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub location: Option<String>,
    pub description: Option<String>,
}

fn resolve_time(time: &GEventTime) -> Option<(DateTime<Utc>, bool)> {
    if let Some(dt) = time.date_time {
        return Some((dt.with_timezone(&Utc), false));
    }
    let date = time.date?;
    Some((date.and_hms_opt(0, 0, 0)?.and_utc(), true))
}

impl CalendarEvent {
    /// `None` for cancelled events and events without usable times.
    pub fn from_provider(event: GEvent) -> Option<Self> {
        if event.status.as_deref() == Some("cancelled") {
            return None;
        }
        let (Some((start, all_day)), Some((end, _))) =
            (resolve_time(&event.start), resolve_time(&event.end))
        else {
            warn!("Skipping calendar event {} without usable times", event.id);
            return None;
        };

        let title = event
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNTITLED_EVENT.to_string());

        Some(Self {
            id: event.id,
            title,
            start,
            end,
            all_day,
            location: event.location.filter(|s| !s.is_empty()),
            description: event.description.filter(|s| !s.is_empty()),
        })
    }
}

pub fn normalize_events(list: GEventList) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = list
        .items
        .into_iter()
        .filter_map(CalendarEvent::from_provider)
        .collect();
    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    events
}

pub fn calendar_cache_key(date: NaiveDate) -> String {
    format!("events:{}", date.format("%Y-%m-%d"))
}

// ============================================================================
// Upstream API
// ============================================================================

#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<GEventList>;
}

pub struct HttpCalendarApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCalendarApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CalendarApi for HttpCalendarApi {
    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<GEventList> {
        let url = format!(
            "{}/calendars/primary/events",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", "250".to_string()),
            ])
            .send()
            .await?;
        let response = check_status(Provider::Calendar.as_str(), response).await?;
        Ok(response.json().await?)
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct CalendarService {
    api: Arc<dyn CalendarApi>,
    tokens: TokenManager,
    cache: Arc<ExternalCache>,
    ttl_minutes: i64,
}

impl CalendarService {
    pub fn new(
        api: Arc<dyn CalendarApi>,
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

    /// Events overlapping the UTC day `date`, sorted by start time.
    ///
    /// The cache is consulted before the stored token is touched, so a hit
    /// never triggers a token refresh.
    pub async fn events_for_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Cached<Vec<CalendarEvent>>> {
        let key = calendar_cache_key(date);
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| LifeHubError::Validation(format!("Invalid date {}", date)))?
            .and_utc();
        let day_end = day_start
            .checked_add_signed(Duration::days(1))
            .ok_or_else(|| LifeHubError::Validation(format!("Date {} is out of range", date)))?;

        self.cache
            .read_through(user_id, Provider::Calendar, &key, self.ttl_minutes, || async {
                let access_token = self.tokens.access_token(user_id).await?;
                debug!("Fetching calendar events for {}", date);
                let list = self
                    .api
                    .list_events(&access_token, day_start, day_end)
                    .await
                    .map_err(|e| self.tokens.rejected(e))?;
                Ok::<_, LifeHubError>(normalize_events(list))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::integrations::oauth::tests::{token, MockRefresher};
    use crate::storage::{MemoryCacheStore, MemoryTokenStore, TokenStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_list() -> GEventList {
        serde_json::from_str(
            r#"{
                "items": [
                    {
                        "id": "late",
                        "status": "confirmed",
                        "summary": "Dinner",
                        "location": "Home",
                        "start": {"dateTime": "2026-01-05T19:00:00+01:00"},
                        "end": {"dateTime": "2026-01-05T21:00:00+01:00"}
                    },
                    {
                        "id": "gone",
                        "status": "cancelled",
                        "summary": "Dentist",
                        "start": {"dateTime": "2026-01-05T09:00:00Z"},
                        "end": {"dateTime": "2026-01-05T10:00:00Z"}
                    },
                    {
                        "id": "allday",
                        "start": {"date": "2026-01-05"},
                        "end": {"date": "2026-01-06"}
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_normalization() {
        let events = normalize_events(sample_list());
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["allday", "late"]);

        assert!(events[0].all_day);
        assert_eq!(events[0].title, "(No title)");
        assert_eq!(events[1].start.to_rfc3339(), "2026-01-05T18:00:00+00:00");
        assert_eq!(events[1].location.as_deref(), Some("Home"));
    }

    #[derive(Default)]
    struct CountingCalendarApi {
        calls: AtomicUsize,
        unauthorized: bool,
    }

    #[async_trait]
    impl CalendarApi for CountingCalendarApi {
        async fn list_events(
            &self,
            access_token: &str,
            _time_min: DateTime<Utc>,
            _time_max: DateTime<Utc>,
        ) -> Result<GEventList> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unauthorized {
                return Err(LifeHubError::Upstream {
                    provider: "calendar".into(),
                    status: 401,
                    message: "Invalid Credentials".into(),
                });
            }
            assert_eq!(access_token, "new-access");
            Ok(sample_list())
        }
    }

    async fn service(
        api: Arc<CountingCalendarApi>,
    ) -> (CalendarService, Arc<MockRefresher>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let tokens = Arc::new(MemoryTokenStore::new());
        tokens
            .save_token("u1", Provider::Calendar, &token(clock.now()))
            .await
            .unwrap();
        let refresher = Arc::new(MockRefresher::default());
        let manager = TokenManager::new(
            Provider::Calendar,
            tokens,
            refresher.clone(),
            clock.clone(),
            60,
        );
        let cache = Arc::new(ExternalCache::new(
            Arc::new(MemoryCacheStore::new()),
            clock.clone(),
        ));
        (CalendarService::new(api, manager, cache, 5), refresher, clock)
    }

    #[tokio::test]
    async fn test_cache_hit_skips_token_refresh() {
        let api = Arc::new(CountingCalendarApi::default());
        let (service, refresher, _) = service(api.clone()).await;
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();

        let first = service.events_for_day("u1", date).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.data.len(), 2);

        let second = service.events_for_day("u1", date).await.unwrap();
        assert!(second.cached);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_revoked_token_asks_to_reconnect() {
        let api = Arc::new(CountingCalendarApi {
            unauthorized: true,
            ..Default::default()
        });
        let (service, _, _) = service(api).await;
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();

        let err = service.events_for_day("u1", date).await.unwrap_err();
        assert!(err.needs_reconnect());
    }

    #[tokio::test]
    async fn test_last_representable_day_is_rejected() {
        let api = Arc::new(CountingCalendarApi::default());
        let (service, _, _) = service(api.clone()).await;

        let err = service
            .events_for_day("u1", NaiveDate::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, LifeHubError::Validation(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }
}
