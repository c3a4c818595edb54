//! VaultAccess - passcode gate in front of each capsule's vault.
//!
//! This module provides:
//! - Passcode setup and verification per capsule
//! - The in-memory unlocked set (never persisted, empty on every launch)
//! - Vault status and partner readiness for the frontend
//!
//! The passcode digest lives only in device secure storage. Losing that
//! storage loses vault access on this device: there is no reset or recovery
//! path, and repeated wrong attempts are not limited.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::security::{hash_passcode, validate_passcode, verify_passcode, PasscodeDigest};
use crate::storage::{CapsuleStore, PasscodeKdfParams, SecureStorage};
use crate::vault::auth::VaultStatus;
use crate::vault::error::{VaultError, VaultResult};

const PASSCODE_KEY_PREFIX: &str = "vault.passcode.";

fn passcode_key(capsule_id: &str) -> String {
    format!("{}{}", PASSCODE_KEY_PREFIX, capsule_id)
}

pub struct VaultAccess {
    party_id: String,
    secure: Arc<dyn SecureStorage>,
    capsules: Arc<dyn CapsuleStore>,
    kdf_params: PasscodeKdfParams,
    /// Capsules unlocked in this process.
    unlocked: RwLock<HashSet<String>>,
}

impl VaultAccess {
    pub fn new(
        party_id: &str,
        secure: Arc<dyn SecureStorage>,
        capsules: Arc<dyn CapsuleStore>,
        kdf_params: PasscodeKdfParams,
    ) -> Self {
        Self {
            party_id: party_id.to_string(),
            secure,
            capsules,
            kdf_params,
            unlocked: RwLock::new(HashSet::new()),
        }
    }

    pub fn party_id(&self) -> &str {
        &self.party_id
    }

    /// Check whether a passcode digest exists on this device for the capsule.
    ///
    /// Absence is the normal first-run state, not an error.
    pub async fn has_local_passcode(&self, capsule_id: &str) -> VaultResult<bool> {
        Ok(self.secure.contains(&passcode_key(capsule_id)).await?)
    }

    /// Set (or replace) the capsule passcode and unlock the vault.
    ///
    /// Re-running setup overwrites the previous digest without asking for the
    /// old passcode. The shared "setup completed" marker is best-effort: local
    /// storage is authoritative.
    ///
    /// # Arguments
    /// * `capsule_id` - The capsule whose vault is being set up
    /// * `passcode` - Exactly six ASCII digits
    ///
    /// # Errors
    /// Returns `Validation` for a malformed passcode, or a storage error if
    /// the digest could not be written locally.
    pub async fn setup_passcode(&self, capsule_id: &str, passcode: &str) -> VaultResult<()> {
        validate_passcode(passcode)?;

        let digest = self.digest_in_background(passcode).await?;
        let encoded = serde_json::to_vec(&digest)
            .map_err(|e| VaultError::Storage(format!("Failed to encode digest: {}", e)))?;
        self.secure.set(&passcode_key(capsule_id), &encoded).await?;
        info!("Vault passcode set for capsule {}", capsule_id);

        if let Err(e) = self
            .capsules
            .mark_vault_setup(capsule_id, &self.party_id)
            .await
        {
            warn!(
                "Could not record vault setup marker for capsule {}: {}",
                capsule_id, e
            );
        }

        self.unlocked.write().await.insert(capsule_id.to_string());
        Ok(())
    }

    /// Check a passcode against the stored digest.
    ///
    /// Returns `false` on mismatch, on malformed input, and when no passcode
    /// has been set up. A match unlocks the capsule for this process.
    pub async fn verify_passcode(&self, capsule_id: &str, passcode: &str) -> VaultResult<bool> {
        let Some(digest) = self.load_digest(capsule_id).await? else {
            debug!("No passcode stored for capsule {}", capsule_id);
            return Ok(false);
        };

        let candidate = passcode.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_passcode(&candidate, &digest))
            .await
            .map_err(|e| VaultError::Storage(format!("Passcode task failed: {}", e)))??;

        if matches {
            self.unlocked.write().await.insert(capsule_id.to_string());
            info!("Vault unlocked for capsule {}", capsule_id);
        } else {
            warn!("Wrong passcode for capsule {}", capsule_id);
        }
        Ok(matches)
    }

    pub async fn is_unlocked(&self, capsule_id: &str) -> bool {
        self.unlocked.read().await.contains(capsule_id)
    }

    pub async fn lock(&self, capsule_id: &str) {
        if self.unlocked.write().await.remove(capsule_id) {
            info!("Vault locked for capsule {}", capsule_id);
        }
    }

    pub async fn lock_all(&self) {
        let mut unlocked = self.unlocked.write().await;
        if !unlocked.is_empty() {
            info!("Locking {} unlocked vault(s)", unlocked.len());
            unlocked.clear();
        }
    }

    pub async fn status(&self, capsule_id: &str) -> VaultResult<VaultStatus> {
        if !self.has_local_passcode(capsule_id).await? {
            return Ok(VaultStatus::NotSetup);
        }
        if self.is_unlocked(capsule_id).await {
            Ok(VaultStatus::Unlocked)
        } else {
            Ok(VaultStatus::Locked)
        }
    }

    /// Whether any other party has recorded the setup marker for the capsule.
    ///
    /// The marker is informational only; it says nothing about the passcode.
    pub async fn partner_ready(&self, capsule_id: &str) -> VaultResult<bool> {
        let parties = self.capsules.vault_setup_parties(capsule_id).await?;
        Ok(parties.iter().any(|party| party != &self.party_id))
    }

    pub async fn require_unlocked(&self, capsule_id: &str) -> VaultResult<()> {
        match self.status(capsule_id).await? {
            VaultStatus::Unlocked => Ok(()),
            VaultStatus::Locked => Err(VaultError::Locked),
            VaultStatus::NotSetup => Err(VaultError::NotSetup),
        }
    }

    async fn load_digest(&self, capsule_id: &str) -> VaultResult<Option<PasscodeDigest>> {
        let Some(bytes) = self.secure.get(&passcode_key(capsule_id)).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| VaultError::Corrupted(format!("Stored passcode digest: {}", e)))
    }

    /// Argon2id is CPU-bound; keep it off the async workers.
    async fn digest_in_background(&self, passcode: &str) -> VaultResult<PasscodeDigest> {
        let passcode = passcode.to_string();
        let params = self.kdf_params;
        let digest = tokio::task::spawn_blocking(move || hash_passcode(&passcode, params))
            .await
            .map_err(|e| VaultError::Storage(format!("Passcode task failed: {}", e)))??;
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{fast_params, sha256_digest};
    use crate::storage::{MemoryCapsuleStore, MemorySecureStorage};

    fn setup() -> (VaultAccess, Arc<MemorySecureStorage>, Arc<MemoryCapsuleStore>) {
        let secure = Arc::new(MemorySecureStorage::new());
        let capsules = Arc::new(MemoryCapsuleStore::new());
        let access = VaultAccess::new("alice", secure.clone(), capsules.clone(), fast_params());
        (access, secure, capsules)
    }

    #[tokio::test]
    async fn test_verify_without_setup_is_false() {
        let (access, _, _) = setup();
        assert!(!access.has_local_passcode("c1").await.unwrap());
        assert!(!access.verify_passcode("c1", "123456").await.unwrap());
        assert_eq!(access.status("c1").await.unwrap(), VaultStatus::NotSetup);
    }

    #[tokio::test]
    async fn test_setup_then_verify() {
        let (access, _, _) = setup();
        access.setup_passcode("c1", "123456").await.unwrap();
        assert!(access.has_local_passcode("c1").await.unwrap());
        assert_eq!(access.status("c1").await.unwrap(), VaultStatus::Unlocked);

        access.lock("c1").await;
        assert_eq!(access.status("c1").await.unwrap(), VaultStatus::Locked);

        assert!(!access.verify_passcode("c1", "654321").await.unwrap());
        assert!(!access.is_unlocked("c1").await);
        assert!(access.verify_passcode("c1", "123456").await.unwrap());
        assert!(access.is_unlocked("c1").await);
    }

    #[tokio::test]
    async fn test_setup_rejects_malformed_passcodes() {
        let (access, _, _) = setup();
        for bad in ["12345", "1234567", "12a456", "", "１２３４５６"] {
            let err = access.setup_passcode("c1", bad).await.unwrap_err();
            assert!(matches!(err, VaultError::Validation(_)), "{:?}", bad);
        }
        assert!(!access.has_local_passcode("c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_rerun_setup_replaces_passcode() {
        let (access, _, _) = setup();
        access.setup_passcode("c1", "123456").await.unwrap();
        access.setup_passcode("c1", "111111").await.unwrap();

        assert!(!access.verify_passcode("c1", "123456").await.unwrap());
        assert!(access.verify_passcode("c1", "111111").await.unwrap());
    }

    #[tokio::test]
    async fn test_passcodes_are_per_capsule() {
        let (access, _, _) = setup();
        access.setup_passcode("c1", "123456").await.unwrap();
        assert!(!access.verify_passcode("c2", "123456").await.unwrap());
        assert!(!access.is_unlocked("c2").await);
    }

    #[tokio::test]
    async fn test_marker_failure_does_not_fail_setup() {
        let (access, _, capsules) = setup();
        capsules.set_fail_markers(true);

        access.setup_passcode("c1", "123456").await.unwrap();
        assert!(access.has_local_passcode("c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_partner_ready_reads_other_marker() {
        let (access, _, capsules) = setup();
        access.setup_passcode("c1", "123456").await.unwrap();
        assert!(!access.partner_ready("c1").await.unwrap());

        capsules.mark_vault_setup("c1", "bob").await.unwrap();
        assert!(access.partner_ready("c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_sha256_digest_still_verifies() {
        let (access, secure, _) = setup();
        let legacy = PasscodeDigest::Sha256 {
            hash: sha256_digest("246810"),
        };
        secure
            .set("vault.passcode.c1", &serde_json::to_vec(&legacy).unwrap())
            .await
            .unwrap();

        assert_eq!(access.status("c1").await.unwrap(), VaultStatus::Locked);
        assert!(access.verify_passcode("c1", "246810").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_all_and_require_unlocked() {
        let (access, _, _) = setup();
        access.setup_passcode("c1", "123456").await.unwrap();
        access.setup_passcode("c2", "123456").await.unwrap();
        access.require_unlocked("c1").await.unwrap();

        access.lock_all().await;
        assert!(matches!(
            access.require_unlocked("c1").await,
            Err(VaultError::Locked)
        ));
        assert!(matches!(
            access.require_unlocked("c3").await,
            Err(VaultError::NotSetup)
        ));
    }
}
