//! In-memory collaborators.
//!
//! Used for offline sessions and as the fakes behind every service test.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{BlobStore, CacheStore, CapsuleStore, TokenStore, VaultItemStore};
use crate::cache::{CacheEntry, CacheKey, Provider};
use crate::error::{LifeHubError, Result};
use crate::integrations::OAuthToken;
use crate::vault::{ApprovalSide, Capsule, SealedContent, VaultItem};

#[derive(Default)]
pub struct MemoryVaultItemStore {
    items: RwLock<HashMap<String, VaultItem>>,
}

impl MemoryVaultItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl VaultItemStore for MemoryVaultItemStore {
    async fn insert(&self, item: &VaultItem) -> Result<()> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.id) {
            return Err(LifeHubError::Storage(format!(
                "Item {} already exists",
                item.id
            )));
        }
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get(&self, item_id: &str) -> Result<Option<VaultItem>> {
        Ok(self.items.read().await.get(item_id).cloned())
    }

    async fn list_by_capsule(&self, capsule_id: &str) -> Result<Vec<VaultItem>> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .filter(|item| item.capsule_id == capsule_id)
            .cloned()
            .collect())
    }

    async fn set_approval(&self, item_id: &str, side: ApprovalSide) -> Result<VaultItem> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(item_id)
            .ok_or_else(|| LifeHubError::NotFound(format!("Vault item {}", item_id)))?;
        item.approve(side);
        Ok(item.clone())
    }

    async fn set_content(&self, item_id: &str, content: &SealedContent) -> Result<()> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(item_id)
            .ok_or_else(|| LifeHubError::NotFound(format!("Vault item {}", item_id)))?;
        item.content = Some(content.clone());
        Ok(())
    }

    async fn delete(&self, item_id: &str) -> Result<()> {
        self.items
            .write()
            .await
            .remove(item_id)
            .map(|_| ())
            .ok_or_else(|| LifeHubError::NotFound(format!("Vault item {}", item_id)))
    }
}

#[derive(Default)]
pub struct MemoryCapsuleStore {
    capsules: RwLock<HashMap<String, Capsule>>,
    setup_markers: RwLock<HashMap<String, HashSet<String>>>,
    public_keys: RwLock<HashMap<String, Vec<u8>>>,
    fail_markers: AtomicBool,
}

impl MemoryCapsuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_capsule(&self, capsule: Capsule) {
        self.capsules
            .write()
            .await
            .insert(capsule.id.clone(), capsule);
    }

    /// Make `mark_vault_setup` fail, simulating the backend being unreachable.
    pub fn set_fail_markers(&self, fail: bool) {
        self.fail_markers.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CapsuleStore for MemoryCapsuleStore {
    async fn get_capsule(&self, capsule_id: &str) -> Result<Option<Capsule>> {
        Ok(self.capsules.read().await.get(capsule_id).cloned())
    }

    async fn mark_vault_setup(&self, capsule_id: &str, party_id: &str) -> Result<()> {
        if self.fail_markers.load(Ordering::SeqCst) {
            return Err(LifeHubError::Storage("Backend unreachable".into()));
        }
        self.setup_markers
            .write()
            .await
            .entry(capsule_id.to_string())
            .or_default()
            .insert(party_id.to_string());
        Ok(())
    }

    async fn vault_setup_parties(&self, capsule_id: &str) -> Result<Vec<String>> {
        let markers = self.setup_markers.read().await;
        let mut parties: Vec<String> = markers
            .get(capsule_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        parties.sort();
        Ok(parties)
    }

    async fn publish_public_key(&self, party_id: &str, public_key: &[u8]) -> Result<()> {
        self.public_keys
            .write()
            .await
            .insert(party_id.to_string(), public_key.to_vec());
        Ok(())
    }

    async fn public_key(&self, party_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.public_keys.read().await.get(party_id).cloned())
    }
}

pub const MEMORY_BLOB_URL_PREFIX: &str = "memory://vault-files/";

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, (Vec<u8>, String)>>,
    fail_removals: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.blobs.read().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub fn set_fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        self.blobs
            .write()
            .await
            .insert(path.to_string(), (bytes.to_vec(), content_type.to_string()));
        debug!("Stored {} byte blob at {}", bytes.len(), path);
        Ok(format!("{}{}", MEMORY_BLOB_URL_PREFIX, path))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(LifeHubError::Storage("Blob removal failed".into()));
        }
        self.blobs.write().await.remove(path);
        Ok(())
    }

    fn path_from_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(MEMORY_BLOB_URL_PREFIX)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<BTreeMap<CacheKey, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<()> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<(String, Provider), OAuthToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get_token(&self, user_id: &str, provider: Provider) -> Result<Option<OAuthToken>> {
        Ok(self
            .tokens
            .read()
            .await
            .get(&(user_id.to_string(), provider))
            .cloned())
    }

    async fn save_token(&self, user_id: &str, provider: Provider, token: &OAuthToken) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert((user_id.to_string(), provider), token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{ContentType, SealedContent};

    fn item(capsule_id: &str) -> VaultItem {
        VaultItem::new_pending(
            capsule_id,
            "alice",
            "Wifi",
            ContentType::Password,
            Some(SealedContent::plaintext("hunter2")),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_set_approval_touches_one_flag() {
        let store = MemoryVaultItemStore::new();
        let item = item("c1");
        store.insert(&item).await.unwrap();

        let updated = store.set_approval(&item.id, ApprovalSide::Partner).await.unwrap();
        assert!(updated.approved_by_uploader);
        assert!(updated.approved_by_partner);
        assert_eq!(updated.title, item.title);
    }

    #[tokio::test]
    async fn test_missing_item_is_not_found() {
        let store = MemoryVaultItemStore::new();
        let err = store
            .set_approval("nope", ApprovalSide::Partner)
            .await
            .unwrap_err();
        assert!(matches!(err, LifeHubError::NotFound(_)));
        assert!(matches!(
            store.delete("nope").await.unwrap_err(),
            LifeHubError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_capsule() {
        let store = MemoryVaultItemStore::new();
        store.insert(&item("c1")).await.unwrap();
        store.insert(&item("c1")).await.unwrap();
        store.insert(&item("c2")).await.unwrap();

        assert_eq!(store.list_by_capsule("c1").await.unwrap().len(), 2);
        assert_eq!(store.list_by_capsule("c3").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_blob_url_roundtrip() {
        let blobs = MemoryBlobStore::new();
        let url = blobs
            .upload("c1/abc-passport.pdf", b"%PDF", "application/pdf")
            .await
            .unwrap();
        assert_eq!(
            blobs.path_from_url(&url).as_deref(),
            Some("c1/abc-passport.pdf")
        );
        assert_eq!(blobs.path_from_url("https://elsewhere/x"), None);
    }
}
