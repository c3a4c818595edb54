#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use lifehub_app_lib::clock::ManualClock;
use lifehub_app_lib::integrations::calendar::GEventList;
use lifehub_app_lib::integrations::weather::OwCurrentWeather;
use lifehub_app_lib::integrations::wearable::{OuraDailyActivity, OuraDailyScore};
use lifehub_app_lib::integrations::{
    CalendarApi, TokenGrant, TokenRefresher, WeatherApi, WearableApi,
};
use lifehub_app_lib::storage::{
    AppSettings, MemoryBlobStore, MemoryCacheStore, MemoryCapsuleStore, MemorySecureStorage,
    MemoryTokenStore, MemoryVaultItemStore, PasscodeKdfParams,
};
use lifehub_app_lib::vault::Capsule;
use lifehub_app_lib::{AppState, Backends, LifeHubError, Providers, Result};

pub const CAPSULE: &str = "capsule-1";

/// Stores shared by both parties, as the hosted backend would be.
pub struct SharedBackend {
    pub items: Arc<MemoryVaultItemStore>,
    pub capsules: Arc<MemoryCapsuleStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub cache: Arc<MemoryCacheStore>,
    pub tokens: Arc<MemoryTokenStore>,
    pub clock: Arc<ManualClock>,
}

impl SharedBackend {
    pub async fn with_capsule(owner: &str, partner: &str) -> Self {
        let capsules = Arc::new(MemoryCapsuleStore::new());
        capsules
            .put_capsule(Capsule {
                id: CAPSULE.into(),
                owner_id: owner.into(),
                partner_id: Some(partner.into()),
                created_at: Utc::now(),
            })
            .await;

        Self {
            items: Arc::new(MemoryVaultItemStore::new()),
            capsules,
            blobs: Arc::new(MemoryBlobStore::new()),
            cache: Arc::new(MemoryCacheStore::new()),
            tokens: Arc::new(MemoryTokenStore::new()),
            clock: Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap(),
            )),
        }
    }

    /// One party's device: its own secure storage, the shared stores.
    pub fn device(&self) -> Backends {
        Backends {
            secure: Arc::new(MemorySecureStorage::new()),
            items: self.items.clone(),
            capsules: self.capsules.clone(),
            blobs: self.blobs.clone(),
            cache: self.cache.clone(),
            tokens: self.tokens.clone(),
            clock: self.clock.clone(),
        }
    }
}

pub fn test_settings() -> AppSettings {
    AppSettings {
        passcode_kdf: PasscodeKdfParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        },
        ..AppSettings::default()
    }
}

pub async fn app_for(party: &str, backends: Backends, providers: Providers) -> AppState {
    AppState::initialize(party, test_settings(), backends, providers)
        .await
        .unwrap()
}

// ============================================================================
// Upstream fakes
// ============================================================================

#[derive(Default)]
pub struct CountingWeatherApi {
    pub calls: AtomicUsize,
    pub status: Option<u16>,
}

impl CountingWeatherApi {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherApi for CountingWeatherApi {
    async fn current(&self, _lat: f64, _lon: f64) -> Result<OwCurrentWeather> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.status {
            return Err(LifeHubError::Upstream {
                provider: "weather".into(),
                status,
                message: "upstream failure".into(),
            });
        }
        Ok(serde_json::from_str(
            r#"{
                "weather": [{"main": "Clouds", "description": "overcast clouds", "icon": "04d"}],
                "main": {"temp": 3.4, "feels_like": -0.6, "humidity": 70},
                "wind": {"speed": 5.1},
                "sys": {"sunrise": 1767615600, "sunset": 1767649560},
                "name": "New York"
            }"#,
        )?)
    }

    fn units(&self) -> &str {
        "metric"
    }
}

pub struct EmptyCalendarApi;

#[async_trait]
impl CalendarApi for EmptyCalendarApi {
    async fn list_events(
        &self,
        _access_token: &str,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> Result<GEventList> {
        Ok(GEventList::default())
    }
}

pub struct EmptyWearableApi;

#[async_trait]
impl WearableApi for EmptyWearableApi {
    async fn daily_sleep(&self, _t: &str, _date: NaiveDate) -> Result<Vec<OuraDailyScore>> {
        Ok(Vec::new())
    }

    async fn daily_readiness(&self, _t: &str, _date: NaiveDate) -> Result<Vec<OuraDailyScore>> {
        Ok(Vec::new())
    }

    async fn daily_activity(&self, _t: &str, _date: NaiveDate) -> Result<Vec<OuraDailyActivity>> {
        Ok(Vec::new())
    }
}

pub struct RejectingRefresher;

#[async_trait]
impl TokenRefresher for RejectingRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
        Err(LifeHubError::Upstream {
            provider: "oauth".into(),
            status: 400,
            message: "invalid_grant".into(),
        })
    }
}

pub fn providers_with_weather(weather: Arc<CountingWeatherApi>) -> Providers {
    Providers {
        weather,
        calendar: Arc::new(EmptyCalendarApi),
        calendar_refresher: Arc::new(RejectingRefresher),
        wearable: Arc::new(EmptyWearableApi),
        wearable_refresher: Arc::new(RejectingRefresher),
    }
}

pub fn offline_providers() -> Providers {
    providers_with_weather(Arc::new(CountingWeatherApi::default()))
}
