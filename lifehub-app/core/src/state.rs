use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{ExternalCache, Provider};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::integrations::{
    build_client, CalendarApi, CalendarService, HttpCalendarApi, HttpTokenRefresher,
    HttpWeatherApi, HttpWearableApi, TokenManager, TokenRefresher, WeatherApi, WeatherService,
    WearableApi, WearableService,
};
use crate::security::{load_or_create_identity, PartyIdentity};
use crate::storage::{
    AppSettings, BlobStore, CacheStore, CapsuleStore, MemoryBlobStore, MemoryCacheStore,
    MemoryCapsuleStore, MemoryTokenStore, MemoryVaultItemStore, SecureStorage, TokenStore,
    VaultItemStore,
};
use crate::vault::{CapsuleKeySealer, ContentSealer, PlaintextSealer, VaultAccess, VaultManager};

/// Persistence collaborators, supplied by the host.
#[derive(Clone)]
pub struct Backends {
    pub secure: Arc<dyn SecureStorage>,
    pub items: Arc<dyn VaultItemStore>,
    pub capsules: Arc<dyn CapsuleStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub cache: Arc<dyn CacheStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// Everything but secure storage kept in process memory.
    pub fn in_memory(secure: Arc<dyn SecureStorage>) -> Self {
        Self {
            secure,
            items: Arc::new(MemoryVaultItemStore::new()),
            capsules: Arc::new(MemoryCapsuleStore::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            cache: Arc::new(MemoryCacheStore::new()),
            tokens: Arc::new(MemoryTokenStore::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Third-party API clients.
#[derive(Clone)]
pub struct Providers {
    pub weather: Arc<dyn WeatherApi>,
    pub calendar: Arc<dyn CalendarApi>,
    pub calendar_refresher: Arc<dyn TokenRefresher>,
    pub wearable: Arc<dyn WearableApi>,
    pub wearable_refresher: Arc<dyn TokenRefresher>,
}

impl Providers {
    /// HTTP clients for the endpoints and credentials in `settings`.
    pub fn http(settings: &AppSettings) -> Result<Self> {
        let client = build_client(settings.http_timeout_secs)?;

        Ok(Self {
            weather: Arc::new(HttpWeatherApi::new(
                client.clone(),
                settings.weather_api_base_url.clone(),
                settings.weather_api_key.clone(),
                settings.weather_units.clone(),
            )),
            calendar: Arc::new(HttpCalendarApi::new(
                client.clone(),
                settings.calendar_api_base_url.clone(),
            )),
            calendar_refresher: Arc::new(HttpTokenRefresher::new(
                Provider::Calendar,
                client.clone(),
                settings.calendar_token_url.clone(),
                settings.calendar_client_id.clone(),
                settings.calendar_client_secret.clone(),
            )),
            wearable: Arc::new(HttpWearableApi::new(
                client.clone(),
                settings.wearable_api_base_url.clone(),
            )),
            wearable_refresher: Arc::new(HttpTokenRefresher::new(
                Provider::Wearable,
                client,
                settings.wearable_token_url.clone(),
                settings.wearable_client_id.clone(),
                settings.wearable_client_secret.clone(),
            )),
        })
    }
}

/// Explicitly constructed services for one signed-in party on this device.
pub struct AppState {
    pub settings: AppSettings,
    pub identity: PartyIdentity,
    pub vault_access: VaultAccess,
    pub vault: VaultManager,
    pub cache: Arc<ExternalCache>,
    pub weather: WeatherService,
    pub calendar: CalendarService,
    pub wearable: WearableService,
}

impl AppState {
    /// Wire every service for `party_id`.
    ///
    /// Loads (or creates) the party's key pair and publishes the public half
    /// so the partner can derive the capsule key. Publishing is best-effort;
    /// sealing will report the partner as not ready until it succeeds on
    /// both sides.
    pub async fn initialize(
        party_id: &str,
        settings: AppSettings,
        backends: Backends,
        providers: Providers,
    ) -> Result<Self> {
        let identity = load_or_create_identity(backends.secure.as_ref(), party_id).await?;
        if let Err(e) = backends
            .capsules
            .publish_public_key(party_id, &identity.public_key)
            .await
        {
            warn!("Failed to publish public key: {}", e);
        }

        let sealer: Arc<dyn ContentSealer> = if settings.encrypt_vault_content {
            Arc::new(CapsuleKeySealer::new(
                identity.clone(),
                backends.capsules.clone(),
            ))
        } else {
            warn!("Vault content encryption is disabled");
            Arc::new(PlaintextSealer)
        };

        let vault_access = VaultAccess::new(
            party_id,
            backends.secure.clone(),
            backends.capsules.clone(),
            settings.passcode_kdf,
        );
        let vault = VaultManager::new(
            backends.items.clone(),
            backends.capsules.clone(),
            backends.blobs.clone(),
            sealer,
            backends.clock.clone(),
        );

        let cache = Arc::new(ExternalCache::new(
            backends.cache.clone(),
            backends.clock.clone(),
        ));
        let weather = WeatherService::new(
            providers.weather,
            cache.clone(),
            settings.weather_ttl_minutes,
            settings.coordinate_precision,
        );
        let calendar = CalendarService::new(
            providers.calendar,
            TokenManager::new(
                Provider::Calendar,
                backends.tokens.clone(),
                providers.calendar_refresher,
                backends.clock.clone(),
                settings.token_refresh_skew_secs,
            ),
            cache.clone(),
            settings.calendar_ttl_minutes,
        );
        let wearable = WearableService::new(
            providers.wearable,
            TokenManager::new(
                Provider::Wearable,
                backends.tokens.clone(),
                providers.wearable_refresher,
                backends.clock.clone(),
                settings.token_refresh_skew_secs,
            ),
            cache.clone(),
            settings.biometrics_ttl_minutes,
        );

        info!("Initialized app state for {}", party_id);
        Ok(Self {
            settings,
            identity,
            vault_access,
            vault,
            cache,
            weather,
            calendar,
            wearable,
        })
    }

    pub fn party_id(&self) -> &str {
        self.vault_access.party_id()
    }
}
