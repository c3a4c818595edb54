//! Sealing of vault text content.
//!
//! Rows keep the `encrypted_content` / `encryption_iv` column shapes either
//! way. A row whose iv is missing or is not a hex AES-GCM nonce is plaintext
//! (written by the first app release, or with encryption switched off) and
//! is returned as stored.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::sync::RwLock;
use tracing::debug;

use crate::security::{
    decrypt_content, derive_capsule_key, derive_shared_secret, encrypt_content, CapsuleKey,
    PartyIdentity, NONCE_SIZE,
};
use crate::storage::CapsuleStore;
use crate::vault::error::{VaultError, VaultResult};
use crate::vault::item::{SealedContent, SealingKeys};

/// Opened text, and whether it should be sealed again under the keys the
/// capsule's parties have published now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub text: String,
    pub stale: bool,
}

#[async_trait]
pub trait ContentSealer: Send + Sync {
    async fn seal(&self, capsule_id: &str, plaintext: &str) -> VaultResult<SealedContent>;

    async fn open(&self, capsule_id: &str, sealed: &SealedContent) -> VaultResult<Opened>;
}

/// Parse the stored iv as an AES-GCM nonce. `None` marks a plaintext row.
fn stored_nonce(sealed: &SealedContent) -> Option<[u8; NONCE_SIZE]> {
    let bytes = hex::decode(sealed.iv.as_deref()?).ok()?;
    bytes.try_into().ok()
}

/// Stores text verbatim, matching rows written without encryption.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextSealer;

#[async_trait]
impl ContentSealer for PlaintextSealer {
    async fn seal(&self, _capsule_id: &str, plaintext: &str) -> VaultResult<SealedContent> {
        Ok(SealedContent::plaintext(plaintext))
    }

    async fn open(&self, _capsule_id: &str, sealed: &SealedContent) -> VaultResult<Opened> {
        if stored_nonce(sealed).is_some() {
            return Err(VaultError::Encryption(
                "Content is sealed but encryption is disabled".into(),
            ));
        }
        Ok(Opened {
            text: sealed.ciphertext.clone(),
            stale: false,
        })
    }
}

/// AES-256-GCM under a key both capsule parties derive from X25519.
///
/// Ciphertext is stored base64, the nonce hex. Each sealed row records the
/// two public keys its content key came from, so the party who still holds
/// one of them can open it after the other party's identity changes.
pub struct CapsuleKeySealer {
    identity: PartyIdentity,
    public_key_hex: String,
    capsules: Arc<dyn CapsuleStore>,
    /// Derived keys by capsule and counterpart public key.
    keys: RwLock<HashMap<(String, Vec<u8>), CapsuleKey>>,
}

impl CapsuleKeySealer {
    pub fn new(identity: PartyIdentity, capsules: Arc<dyn CapsuleStore>) -> Self {
        let public_key_hex = hex::encode(&identity.public_key);
        Self {
            identity,
            public_key_hex,
            capsules,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// The public key the other party of `capsule_id` has published.
    async fn current_partner_key(&self, capsule_id: &str) -> VaultResult<Vec<u8>> {
        let capsule = self
            .capsules
            .get_capsule(capsule_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("Capsule {}", capsule_id)))?;
        let partner_id = capsule
            .counterpart_of(&self.identity.party_id)
            .ok_or(VaultError::PartnerNotReady)?;
        self.capsules
            .public_key(partner_id)
            .await?
            .ok_or(VaultError::PartnerNotReady)
    }

    async fn capsule_key(&self, capsule_id: &str, counterpart: &[u8]) -> VaultResult<CapsuleKey> {
        let cache_key = (capsule_id.to_string(), counterpart.to_vec());
        if let Some(key) = self.keys.read().await.get(&cache_key) {
            return Ok(key.clone());
        }

        let shared = derive_shared_secret(&self.identity.private_key, counterpart)?;
        let key = derive_capsule_key(&shared, capsule_id);
        debug!("Derived content key for capsule {}", capsule_id);

        self.keys.write().await.insert(cache_key, key.clone());
        Ok(key)
    }

    /// Pick the counterpart key out of a row's recorded keys.
    fn recorded_counterpart(&self, capsule_id: &str, keys: &SealingKeys) -> VaultResult<Vec<u8>> {
        let other = if keys.sealer == self.public_key_hex {
            &keys.recipient
        } else if keys.recipient == self.public_key_hex {
            &keys.sealer
        } else {
            return Err(VaultError::KeyUnavailable(capsule_id.to_string()));
        };
        hex::decode(other)
            .map_err(|_| VaultError::Corrupted("Recorded public key is not hex".into()))
    }
}

#[async_trait]
impl ContentSealer for CapsuleKeySealer {
    async fn seal(&self, capsule_id: &str, plaintext: &str) -> VaultResult<SealedContent> {
        let partner_key = self.current_partner_key(capsule_id).await?;
        let key = self.capsule_key(capsule_id, &partner_key).await?;
        let (nonce, ciphertext) = encrypt_content(plaintext.as_bytes(), key.as_bytes())?;

        Ok(SealedContent {
            ciphertext: BASE64.encode(ciphertext),
            iv: Some(hex::encode(nonce)),
            keys: Some(SealingKeys {
                sealer: self.public_key_hex.clone(),
                recipient: hex::encode(&partner_key),
            }),
        })
    }

    async fn open(&self, capsule_id: &str, sealed: &SealedContent) -> VaultResult<Opened> {
        let Some(nonce) = stored_nonce(sealed) else {
            return Ok(Opened {
                text: sealed.ciphertext.clone(),
                stale: false,
            });
        };

        let ciphertext = BASE64
            .decode(&sealed.ciphertext)
            .map_err(|e| VaultError::Corrupted(format!("Ciphertext is not base64: {}", e)))?;
        // Rows without recorded keys were sealed under the keys published then
        let counterpart = match &sealed.keys {
            Some(keys) => self.recorded_counterpart(capsule_id, keys)?,
            None => self.current_partner_key(capsule_id).await?,
        };
        let key = self.capsule_key(capsule_id, &counterpart).await?;
        let plaintext = decrypt_content(&nonce, &ciphertext, key.as_bytes())?;
        let text = String::from_utf8(plaintext)
            .map_err(|_| VaultError::Corrupted("Decrypted content is not UTF-8".into()))?;

        let stale = match &sealed.keys {
            None => true,
            Some(_) => match self.current_partner_key(capsule_id).await {
                Ok(current) => current != counterpart,
                Err(e) => {
                    debug!("Partner key lookup for capsule {} failed: {}", capsule_id, e);
                    false
                }
            },
        };
        Ok(Opened { text, stale })
    }
}
