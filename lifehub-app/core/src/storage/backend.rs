//! Collaborator seams for the hosted backend.
//!
//! The hosted store (row-level authorization, real-time sync), blob storage
//! and the integration token table are reached only through these traits.
//! Services receive them as `Arc<dyn ...>` at construction time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cache::{CacheEntry, CacheKey, Provider};
use crate::error::Result;
use crate::integrations::OAuthToken;
use crate::vault::{ApprovalSide, Capsule, SealedContent, VaultItem};

#[async_trait]
pub trait VaultItemStore: Send + Sync {
    async fn insert(&self, item: &VaultItem) -> Result<()>;

    async fn get(&self, item_id: &str) -> Result<Option<VaultItem>>;

    async fn list_by_capsule(&self, capsule_id: &str) -> Result<Vec<VaultItem>>;

    /// Atomically set a single approval flag to true and return the updated
    /// record. Touches no other field, so concurrent approvals from the two
    /// parties cannot clobber each other.
    ///
    /// Fails with `NotFound` when the item does not exist.
    async fn set_approval(&self, item_id: &str, side: ApprovalSide) -> Result<VaultItem>;

    /// Replace the sealed text of an item, leaving the approval flags alone.
    ///
    /// Fails with `NotFound` when the item does not exist.
    async fn set_content(&self, item_id: &str, content: &SealedContent) -> Result<()>;

    /// Fails with `NotFound` when the item does not exist.
    async fn delete(&self, item_id: &str) -> Result<()>;
}

#[async_trait]
pub trait CapsuleStore: Send + Sync {
    async fn get_capsule(&self, capsule_id: &str) -> Result<Option<Capsule>>;

    /// Record the non-authoritative "vault setup completed" marker.
    async fn mark_vault_setup(&self, capsule_id: &str, party_id: &str) -> Result<()>;

    async fn vault_setup_parties(&self, capsule_id: &str) -> Result<Vec<String>>;

    async fn publish_public_key(&self, party_id: &str, public_key: &[u8]) -> Result<()>;

    async fn public_key(&self, party_id: &str) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes at `path` and return their public URL.
    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String>;

    async fn remove(&self, path: &str) -> Result<()>;

    /// Recover the storage path from a URL this store handed out.
    fn path_from_url(&self, url: &str) -> Option<String>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Raw lookup. Expiry is enforced by the caller, not the store.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    async fn upsert(&self, entry: CacheEntry) -> Result<()>;

    /// Remove entries whose expiry is at or before `now`; returns how many.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_token(&self, user_id: &str, provider: Provider) -> Result<Option<OAuthToken>>;

    async fn save_token(&self, user_id: &str, provider: Provider, token: &OAuthToken) -> Result<()>;
}
