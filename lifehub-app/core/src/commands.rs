//! Frontend-facing operations.
//!
//! Each command acts as the signed-in party held in [`AppState`] and returns
//! serializable values or a [`LifeHubError`] the bridge can forward as is.
//! Item commands require the capsule's vault to be unlocked in this process.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::Cached;
use crate::error::{LifeHubError, Result};
use crate::integrations::{BiometricsSummary, CalendarEvent, WeatherSnapshot};
use crate::state::AppState;
use crate::storage::AppSettings;
use crate::vault::{ContentType, FileRef, VaultError, VaultItemView, VaultPayload, VaultStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatusInfo {
    pub status: VaultStatus,
    pub partner_ready: bool,
}

// Vault access commands

pub async fn get_vault_status(state: &AppState, capsule_id: &str) -> Result<VaultStatusInfo> {
    let status = state.vault_access.status(capsule_id).await?;
    let partner_ready = match state.vault_access.partner_ready(capsule_id).await {
        Ok(ready) => ready,
        Err(e) => {
            warn!("Could not read partner readiness: {}", e);
            false
        }
    };
    Ok(VaultStatusInfo {
        status,
        partner_ready,
    })
}

pub async fn setup_vault_passcode(state: &AppState, capsule_id: &str, passcode: &str) -> Result<()> {
    state.vault.require_party(capsule_id, state.party_id()).await?;
    state
        .vault_access
        .setup_passcode(capsule_id, passcode)
        .await?;
    Ok(())
}

/// Verify the passcode and unlock. A wrong passcode is `InvalidPasscode`.
pub async fn unlock_vault(state: &AppState, capsule_id: &str, passcode: &str) -> Result<()> {
    if state
        .vault_access
        .verify_passcode(capsule_id, passcode)
        .await?
    {
        Ok(())
    } else {
        Err(LifeHubError::InvalidPasscode)
    }
}

pub async fn lock_vault(state: &AppState, capsule_id: &str) -> Result<()> {
    state.vault_access.lock(capsule_id).await;
    Ok(())
}

/// Lock every capsule, e.g. when the app goes to the background.
pub async fn lock_all_vaults(state: &AppState) -> Result<()> {
    state.vault_access.lock_all().await;
    Ok(())
}

// Vault item commands

pub async fn list_vault_items(state: &AppState, capsule_id: &str) -> Result<Vec<VaultItemView>> {
    state.vault_access.require_unlocked(capsule_id).await?;
    Ok(state.vault.list_items(capsule_id, state.party_id()).await?)
}

pub async fn upload_vault_text(
    state: &AppState,
    capsule_id: &str,
    title: &str,
    content_type: ContentType,
    content: &str,
) -> Result<VaultItemView> {
    state.vault_access.require_unlocked(capsule_id).await?;
    let item = state
        .vault
        .upload_item(
            capsule_id,
            state.party_id(),
            title,
            content_type,
            VaultPayload::Text(content.to_string()),
        )
        .await?;
    Ok(VaultItemView::redacted(&item, state.party_id()))
}

/// Store a file in blob storage, then create the item pointing at it.
///
/// If the item cannot be created the stored file is removed again.
pub async fn upload_vault_file(
    state: &AppState,
    capsule_id: &str,
    title: &str,
    content_type: ContentType,
    file_name: &str,
    mime_type: &str,
    bytes: &[u8],
) -> Result<VaultItemView> {
    state.vault_access.require_unlocked(capsule_id).await?;
    if !content_type.is_file() {
        return Err(VaultError::Validation(format!(
            "A {} item takes text, not a file",
            content_type
        ))
        .into());
    }
    if bytes.is_empty() {
        return Err(LifeHubError::Validation("File is empty".into()));
    }
    state.vault.require_party(capsule_id, state.party_id()).await?;

    let name = file_base_name(file_name);
    let path = format!("{}/{}-{}", capsule_id, Uuid::new_v4(), name);
    let blobs = state.vault.blobs();
    let url = blobs.upload(&path, bytes, mime_type).await?;
    debug!("Uploaded {} bytes to {}", bytes.len(), path);

    let file = FileRef {
        url,
        name: name.to_string(),
        size: bytes.len() as u64,
        mime_type: mime_type.to_string(),
    };
    let result = state
        .vault
        .upload_item(
            capsule_id,
            state.party_id(),
            title,
            content_type,
            VaultPayload::File(file),
        )
        .await;

    match result {
        Ok(item) => Ok(VaultItemView::redacted(&item, state.party_id())),
        Err(e) => {
            if let Err(cleanup) = blobs.remove(&path).await {
                warn!("Failed to remove orphaned upload {}: {}", path, cleanup);
            }
            Err(e.into())
        }
    }
}

pub async fn approve_vault_item(
    state: &AppState,
    capsule_id: &str,
    item_id: &str,
) -> Result<VaultItemView> {
    state.vault_access.require_unlocked(capsule_id).await?;
    let current = state.vault.get_item(item_id, state.party_id()).await?;
    if current.capsule_id != capsule_id {
        return Err(LifeHubError::NotFound(format!(
            "Vault item {} in capsule {}",
            item_id, capsule_id
        )));
    }

    state.vault.approve_item(item_id, state.party_id()).await?;
    Ok(state.vault.get_item(item_id, state.party_id()).await?)
}

/// Delete an item. An item that is already gone counts as deleted.
pub async fn delete_vault_item(state: &AppState, capsule_id: &str, item_id: &str) -> Result<()> {
    state.vault_access.require_unlocked(capsule_id).await?;
    match state.vault.delete_item(item_id, capsule_id).await {
        Ok(()) => Ok(()),
        Err(VaultError::NotFound(what)) => {
            info!("Delete of {} skipped, already gone", what);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// Integration commands

pub async fn get_weather(state: &AppState, lat: f64, lon: f64) -> Result<Cached<WeatherSnapshot>> {
    state.weather.current(state.party_id(), lat, lon).await
}

pub async fn get_calendar_events(
    state: &AppState,
    date: NaiveDate,
) -> Result<Cached<Vec<CalendarEvent>>> {
    state.calendar.events_for_day(state.party_id(), date).await
}

pub async fn get_biometrics(state: &AppState, date: NaiveDate) -> Result<Cached<BiometricsSummary>> {
    state.wearable.summary_for_day(state.party_id(), date).await
}

pub async fn purge_expired_cache(state: &AppState) -> Result<usize> {
    state.cache.purge_expired().await
}

// Settings commands

pub async fn get_settings(state: &AppState) -> Result<AppSettings> {
    Ok(state.settings.clone())
}

fn file_base_name(file_name: &str) -> &str {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    if name.is_empty() {
        "file"
    } else {
        name
    }
}
