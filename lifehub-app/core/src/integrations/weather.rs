//! Current conditions from the weather provider, cached per rounded location.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{Cached, ExternalCache, Provider};
use crate::error::{LifeHubError, Result};
use crate::integrations::http::check_status;

// ============================================================================
// Provider payload
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OwCondition {
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwMain {
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwWind {
    pub speed: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwSys {
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwCurrentWeather {
    #[serde(default)]
    pub weather: Vec<OwCondition>,
    pub main: OwMain,
    #[serde(default)]
    pub wind: OwWind,
    #[serde(default)]
    pub sys: OwSys,
    #[serde(default)]
    pub name: String,
}

// ============================================================================
// Normalized shape
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Rain,
    Drizzle,
    Thunderstorm,
    Snow,
    Fog,
    Unknown,
}

impl WeatherCondition {
    pub fn from_provider(main: &str) -> Self {
        match main {
            "Clear" => Self::Clear,
            "Clouds" => Self::Clouds,
            "Rain" | "Squall" => Self::Rain,
            "Drizzle" => Self::Drizzle,
            "Thunderstorm" | "Tornado" => Self::Thunderstorm,
            "Snow" => Self::Snow,
            "Mist" | "Fog" | "Haze" | "Smoke" | "Dust" | "Sand" | "Ash" => Self::Fog,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub location: String,
    pub temperature: i32,
    pub feels_like: i32,
    pub humidity: u8,
    pub wind_speed: f64,
    pub condition: WeatherCondition,
    pub description: String,
    pub icon: String,
    pub units: String,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
}

impl WeatherSnapshot {
    pub fn from_provider(raw: OwCurrentWeather, units: &str) -> Self {
        let (condition, description, icon) = match raw.weather.into_iter().next() {
            Some(c) => (WeatherCondition::from_provider(&c.main), c.description, c.icon),
            None => (WeatherCondition::Unknown, String::new(), String::new()),
        };

        Self {
            location: raw.name,
            temperature: raw.main.temp.round() as i32,
            feels_like: raw.main.feels_like.round() as i32,
            humidity: raw.main.humidity,
            wind_speed: (raw.wind.speed * 10.0).round() / 10.0,
            condition,
            description,
            icon,
            units: units.to_string(),
            sunrise: raw.sys.sunrise.and_then(|t| DateTime::from_timestamp(t, 0)),
            sunset: raw.sys.sunset.and_then(|t| DateTime::from_timestamp(t, 0)),
        }
    }
}

// ============================================================================
// Upstream API
// ============================================================================

#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn current(&self, lat: f64, lon: f64) -> Result<OwCurrentWeather>;

    fn units(&self) -> &str;
}

pub struct HttpWeatherApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    units: String,
}

impl HttpWeatherApi {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        units: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            units: units.into(),
        }
    }
}

#[async_trait]
impl WeatherApi for HttpWeatherApi {
    async fn current(&self, lat: f64, lon: f64) -> Result<OwCurrentWeather> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LifeHubError::Config("Weather API key is not configured".into()))?;

        let url = format!("{}/weather", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("units", self.units.clone()),
                ("appid", api_key.to_string()),
            ])
            .send()
            .await?;
        let response = check_status(Provider::Weather.as_str(), response).await?;
        Ok(response.json().await?)
    }

    fn units(&self) -> &str {
        &self.units
    }
}

// ============================================================================
// Service
// ============================================================================

/// Decimal places beyond this (about 0.1 m) only split the cache.
pub const MAX_COORDINATE_PRECISION: u32 = 6;

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(MAX_COORDINATE_PRECISION) as i32);
    // Adding 0.0 turns -0.0 into 0.0 so both format the same
    (value * factor).round() / factor + 0.0
}

/// Cache key for a location. Nearby requests that round to the same
/// coordinates share one entry.
pub fn weather_cache_key(lat: f64, lon: f64, precision: u32) -> String {
    let precision = precision.min(MAX_COORDINATE_PRECISION);
    let p = precision as usize;
    format!(
        "weather:{:.*}:{:.*}",
        p,
        round_to(lat, precision),
        p,
        round_to(lon, precision)
    )
}

fn validate_coordinates(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(LifeHubError::Validation(format!("Invalid latitude {}", lat)));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(LifeHubError::Validation(format!("Invalid longitude {}", lon)));
    }
    Ok(())
}

pub struct WeatherService {
    api: Arc<dyn WeatherApi>,
    cache: Arc<ExternalCache>,
    ttl_minutes: i64,
    precision: u32,
}

impl WeatherService {
    pub fn new(
        api: Arc<dyn WeatherApi>,
        cache: Arc<ExternalCache>,
        ttl_minutes: i64,
        precision: u32,
    ) -> Self {
        Self {
            api,
            cache,
            ttl_minutes,
            precision,
        }
    }

    pub async fn current(&self, user_id: &str, lat: f64, lon: f64) -> Result<Cached<WeatherSnapshot>> {
        validate_coordinates(lat, lon)?;

        let key = weather_cache_key(lat, lon, self.precision);
        let (lat, lon) = (round_to(lat, self.precision), round_to(lon, self.precision));

        self.cache
            .read_through(user_id, Provider::Weather, &key, self.ttl_minutes, || async {
                debug!("Fetching weather for {}, {}", lat, lon);
                let raw = self.api.current(lat, lon).await?;
                Ok::<_, LifeHubError>(WeatherSnapshot::from_provider(raw, self.api.units()))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryCacheStore;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_payload() -> OwCurrentWeather {
        serde_json::from_str(
            r#"{
                "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
                "main": {"temp": 12.6, "feels_like": 11.4, "humidity": 81, "pressure": 1012},
                "wind": {"speed": 4.12, "deg": 240},
                "sys": {"country": "US", "sunrise": 1767614400, "sunset": 1767649200},
                "name": "New York"
            }"#,
        )
        .unwrap()
    }

    #[derive(Default)]
    struct CountingWeatherApi {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WeatherApi for CountingWeatherApi {
        async fn current(&self, _lat: f64, _lon: f64) -> Result<OwCurrentWeather> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(sample_payload())
        }

        fn units(&self) -> &str {
            "metric"
        }
    }

    fn service() -> (WeatherService, Arc<CountingWeatherApi>, Arc<ManualClock>) {
        let api = Arc::new(CountingWeatherApi::default());
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(ExternalCache::new(
            Arc::new(MemoryCacheStore::new()),
            clock.clone(),
        ));
        (WeatherService::new(api.clone(), cache, 15, 2), api, clock)
    }

    #[test]
    fn test_normalization() {
        let snapshot = WeatherSnapshot::from_provider(sample_payload(), "metric");
        assert_eq!(snapshot.temperature, 13);
        assert_eq!(snapshot.feels_like, 11);
        assert_eq!(snapshot.humidity, 81);
        assert_eq!(snapshot.wind_speed, 4.1);
        assert_eq!(snapshot.condition, WeatherCondition::Rain);
        assert_eq!(snapshot.location, "New York");
        assert_eq!(
            snapshot.sunrise.map(|t| t.timestamp()),
            Some(1767614400)
        );
    }

    #[test]
    fn test_condition_mapping() {
        assert_eq!(WeatherCondition::from_provider("Haze"), WeatherCondition::Fog);
        assert_eq!(WeatherCondition::from_provider("Clouds"), WeatherCondition::Clouds);
        assert_eq!(WeatherCondition::from_provider("Volcano"), WeatherCondition::Unknown);
    }

    #[test]
    fn test_cache_key_rounds_coordinates() {
        assert_eq!(weather_cache_key(40.7128, -74.0060, 2), "weather:40.71:-74.01");
        assert_eq!(
            weather_cache_key(40.714, -74.004, 2),
            weather_cache_key(40.709, -74.0, 2)
        );
        assert_eq!(weather_cache_key(-0.001, 0.0, 2), "weather:0.00:0.00");
    }

    #[test]
    fn test_cache_key_precision_is_capped() {
        for precision in [MAX_COORDINATE_PRECISION, 400, u32::MAX] {
            assert_eq!(
                weather_cache_key(40.7128, -74.006, precision),
                "weather:40.712800:-74.006000"
            );
        }
        assert_eq!(round_to(40.71284999, 400), 40.71285);
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let (service, api, clock) = service();

        let first = service.current("u1", 40.71, -74.00).await.unwrap();
        assert!(!first.cached);
        let second = service.current("u1", 40.71, -74.00).await.unwrap();
        assert!(second.cached);
        assert_eq!(first.data, second.data);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::minutes(15));
        let third = service.current("u1", 40.71, -74.00).await.unwrap();
        assert!(!third.cached);
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_coordinates_never_reach_upstream() {
        let (service, api, _) = service();
        assert!(service.current("u1", 91.0, 0.0).await.is_err());
        assert!(service.current("u1", 0.0, f64::NAN).await.is_err());
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }
}
