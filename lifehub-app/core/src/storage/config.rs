use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Argon2id cost parameters for passcode digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasscodeKdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasscodeKdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MiB, OWASP minimum for Argon2id
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub weather_ttl_minutes: i64,
    pub calendar_ttl_minutes: i64,
    pub biometrics_ttl_minutes: i64,
    /// Decimal places kept when building weather cache keys from coordinates.
    pub coordinate_precision: u32,

    pub weather_api_base_url: String,
    pub weather_api_key: Option<String>,
    pub weather_units: String,

    pub calendar_api_base_url: String,
    pub calendar_token_url: String,
    pub calendar_client_id: Option<String>,
    pub calendar_client_secret: Option<String>,

    pub wearable_api_base_url: String,
    pub wearable_token_url: String,
    pub wearable_client_id: Option<String>,
    pub wearable_client_secret: Option<String>,

    pub http_timeout_secs: u64,
    /// Access tokens are treated as expired this many seconds early.
    pub token_refresh_skew_secs: i64,

    pub passcode_kdf: PasscodeKdfParams,
    /// Seal vault text content with the capsule key instead of storing it verbatim.
    pub encrypt_vault_content: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            weather_ttl_minutes: 15,
            calendar_ttl_minutes: 5,
            biometrics_ttl_minutes: 30,
            coordinate_precision: 2,
            weather_api_base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            weather_api_key: None,
            weather_units: "metric".to_string(),
            calendar_api_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            calendar_token_url: "https://oauth2.googleapis.com/token".to_string(),
            calendar_client_id: None,
            calendar_client_secret: None,
            wearable_api_base_url: "https://api.ouraring.com/v2/usercollection".to_string(),
            wearable_token_url: "https://api.ouraring.com/oauth/token".to_string(),
            wearable_client_id: None,
            wearable_client_secret: None,
            http_timeout_secs: 20,
            token_refresh_skew_secs: 60,
            passcode_kdf: PasscodeKdfParams::default(),
            encrypt_vault_content: true,
        }
    }
}

fn get_settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

pub fn load_settings(data_dir: &Path) -> Result<AppSettings> {
    let path = get_settings_path(data_dir);

    if !path.exists() {
        return Ok(AppSettings::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: AppSettings = serde_json::from_str(&content)?;
    Ok(settings)
}

pub fn save_settings(data_dir: &Path, settings: &AppSettings) -> Result<()> {
    let path = get_settings_path(data_dir);
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, content)?;
    Ok(())
}
