//! Device-local secure key/value storage.
//!
//! Holds nothing but passcode credentials and party key material. Values in
//! here are never synced to the hosted backend.
//!
//! `FileSecureStorage` keeps one JSON document in the app data directory with
//! owner-only permissions; the mobile shell may swap in a Keychain/Keystore
//! backed implementation through the same trait.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{LifeHubError, Result};

/// File name for the secure store document.
pub const SECURE_STORE_FILE_NAME: &str = "secure-store.json";

#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Idempotent: deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

pub struct FileSecureStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles on the backing file.
    lock: Mutex<()>,
}

impl FileSecureStorage {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(SECURE_STORE_FILE_NAME),
            lock: Mutex::new(()),
        })
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| {
            LifeHubError::Storage(format!("Failed to parse secure store: {}", e))
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_vec(entries)?;

        // Write atomically (write to temp file, then rename)
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }
}

#[async_trait]
impl SecureStorage for FileSecureStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock.lock().await;
        let entries = self.read_all()?;
        entries
            .get(key)
            .map(|encoded| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| LifeHubError::Storage(format!("Corrupt secure value: {}", e)))
            })
            .transpose()
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all()?;
        entries.insert(
            key.to_string(),
            base64::engine::general_purpose::STANDARD.encode(value),
        );
        self.write_all(&entries)?;
        debug!("Stored {} byte secure value", value.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Process-lifetime secure storage, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySecureStorage {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every stored value, like an OS wiping app data.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[async_trait]
impl SecureStorage for MemorySecureStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
