//! Third-party data providers.
//!
//! Every provider follows the same protocol: build a deterministic cache
//! key, serve a valid cache entry if there is one, otherwise call the
//! provider, normalize its payload and cache the normalized value. Non-2xx
//! answers surface as `Upstream` errors and are never cached.

pub mod calendar;
pub mod http;
pub mod oauth;
pub mod weather;
pub mod wearable;

pub use calendar::{CalendarApi, CalendarEvent, CalendarService, HttpCalendarApi};
pub use http::build_client;
pub use oauth::{HttpTokenRefresher, OAuthToken, TokenGrant, TokenManager, TokenRefresher};
pub use weather::{HttpWeatherApi, WeatherApi, WeatherCondition, WeatherService, WeatherSnapshot};
pub use wearable::{BiometricsSummary, HttpWearableApi, WearableApi, WearableService};
