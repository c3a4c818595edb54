use aes_gcm::aead::OsRng;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{LifeHubError, Result};
use crate::storage::SecureStorage;

/// Secure storage key for this device's party identity.
pub const IDENTITY_STORAGE_KEY: &str = "party.identity";

const CAPSULE_KEY_CONTEXT: &[u8] = b"lifehub/capsule-vault-key/v1";

/// This device's party in every capsule it belongs to.
#[derive(Clone, Serialize, Deserialize)]
pub struct PartyIdentity {
    pub party_id: String,
    pub public_key: Vec<u8>,
    /// X25519 private key. Lives only in device secure storage.
    pub private_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for PartyIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartyIdentity")
            .field("party_id", &self.party_id)
            .field("public_key", &hex::encode(&self.public_key))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// A 256-bit capsule content key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CapsuleKey {
    key: [u8; 32],
}

impl CapsuleKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for CapsuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a new party identity with a fresh X25519 keypair.
///
/// The caller persists it; see [`load_or_create_identity`].
pub fn generate_party_identity(party_id: &str) -> PartyIdentity {
    let private_key = StaticSecret::random_from_rng(OsRng);
    let public_key = PublicKey::from(&private_key);

    PartyIdentity {
        party_id: party_id.to_string(),
        public_key: public_key.as_bytes().to_vec(),
        private_key: private_key.to_bytes().to_vec(),
        created_at: Utc::now(),
    }
}

/// Load this device's identity from secure storage, creating it on first run.
///
/// An identity stored for a different party (account switch on the same
/// device) is replaced.
pub async fn load_or_create_identity(
    storage: &dyn SecureStorage,
    party_id: &str,
) -> Result<PartyIdentity> {
    if let Some(bytes) = storage.get(IDENTITY_STORAGE_KEY).await? {
        let identity: PartyIdentity = serde_json::from_slice(&bytes)?;
        if identity.party_id == party_id {
            debug!("Loaded party identity for {}", party_id);
            return Ok(identity);
        }
        info!("Stored identity belongs to another account, replacing it");
    }

    let identity = generate_party_identity(party_id);
    storage
        .set(IDENTITY_STORAGE_KEY, &serde_json::to_vec(&identity)?)
        .await?;
    info!("Created party identity for {}", party_id);
    Ok(identity)
}

/// Derive a shared secret using X25519 ECDH.
pub fn derive_shared_secret(our_private_key: &[u8], their_public_key: &[u8]) -> Result<[u8; 32]> {
    let private_bytes: [u8; 32] = our_private_key
        .try_into()
        .map_err(|_| LifeHubError::Encryption("Private key must be 32 bytes".into()))?;
    let public_bytes: [u8; 32] = their_public_key
        .try_into()
        .map_err(|_| LifeHubError::Encryption("Public key must be 32 bytes".into()))?;

    let our_secret = StaticSecret::from(private_bytes);
    let their_public = PublicKey::from(public_bytes);

    Ok(our_secret.diffie_hellman(&their_public).to_bytes())
}

/// Bind an ECDH shared secret to one capsule.
///
/// Both parties derive the same key from their own private key and the
/// other party's public key.
pub fn derive_capsule_key(shared_secret: &[u8; 32], capsule_id: &str) -> CapsuleKey {
    let mut hasher = Sha256::new();
    hasher.update(CAPSULE_KEY_CONTEXT);
    hasher.update((capsule_id.len() as u64).to_be_bytes());
    hasher.update(capsule_id.as_bytes());
    hasher.update(shared_secret);

    let mut key = [0u8; 32];
    key.copy_from_slice(&hasher.finalize());
    CapsuleKey { key }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySecureStorage;

    #[test]
    fn test_generate_identity_creates_valid_keys() {
        let identity = generate_party_identity("alice");

        assert_eq!(identity.public_key.len(), 32);
        assert_eq!(identity.private_key.len(), 32);
        assert_eq!(identity.party_id, "alice");
    }

    #[test]
    fn test_both_parties_derive_same_capsule_key() {
        let alice = generate_party_identity("alice");
        let bob = generate_party_identity("bob");

        let alice_shared = derive_shared_secret(&alice.private_key, &bob.public_key).unwrap();
        let bob_shared = derive_shared_secret(&bob.private_key, &alice.public_key).unwrap();
        assert_eq!(alice_shared, bob_shared);

        let a = derive_capsule_key(&alice_shared, "capsule-1");
        let b = derive_capsule_key(&bob_shared, "capsule-1");
        assert_eq!(a.as_bytes(), b.as_bytes());

        let other = derive_capsule_key(&alice_shared, "capsule-2");
        assert_ne!(a.as_bytes(), other.as_bytes());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let identity = generate_party_identity("alice");
        let printed = format!("{:?}", identity);
        assert!(printed.contains("[REDACTED]"));
        assert!(!printed.contains(&hex::encode(&identity.private_key)));
    }

    #[tokio::test]
    async fn test_identity_is_stable_across_loads() {
        let storage = MemorySecureStorage::new();
        let first = load_or_create_identity(&storage, "alice").await.unwrap();
        let second = load_or_create_identity(&storage, "alice").await.unwrap();
        assert_eq!(first.public_key, second.public_key);

        let switched = load_or_create_identity(&storage, "carol").await.unwrap();
        assert_ne!(switched.public_key, first.public_key);
        assert_eq!(switched.party_id, "carol");
    }
}
