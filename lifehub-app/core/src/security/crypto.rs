use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

use crate::error::{LifeHubError, Result};

pub const NONCE_SIZE: usize = 12;

/// Encrypt `content` with AES-256-GCM under a fresh random nonce.
///
/// Returns `(nonce, ciphertext_with_tag)`.
pub fn encrypt_content(content: &[u8], key: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
    if key.len() != 32 {
        return Err(LifeHubError::Encryption("Key must be 32 bytes".into()));
    }

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| LifeHubError::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, content)
        .map_err(|e| LifeHubError::Encryption(e.to_string()))?;

    Ok((nonce_bytes, ciphertext))
}

pub fn decrypt_content(nonce: &[u8], ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 32 {
        return Err(LifeHubError::Encryption("Key must be 32 bytes".into()));
    }
    if nonce.len() != NONCE_SIZE {
        return Err(LifeHubError::Encryption("Nonce must be 12 bytes".into()));
    }

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| LifeHubError::Encryption(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| LifeHubError::Encryption(e.to_string()))
}
