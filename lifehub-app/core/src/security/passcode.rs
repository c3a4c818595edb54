//! Passcode digests for the capsule vault.
//!
//! A passcode is exactly six ASCII digits. Only a one-way digest ever leaves
//! this module; the digest records which algorithm produced it so that
//! credentials written by older app versions (unsalted SHA-256) still verify.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{LifeHubError, Result};
use crate::storage::PasscodeKdfParams;

pub const PASSCODE_LENGTH: usize = 6;

const SALT_SIZE: usize = 16;
const DIGEST_LEN: usize = 32;

/// Stored form of a passcode credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum PasscodeDigest {
    Argon2id {
        #[serde(with = "hex")]
        salt: Vec<u8>,
        #[serde(with = "hex")]
        hash: Vec<u8>,
        params: PasscodeKdfParams,
    },
    /// Unsalted hex SHA-256 of the passcode, as written by the first app release.
    Sha256 {
        #[serde(with = "hex")]
        hash: Vec<u8>,
    },
}

pub fn validate_passcode(passcode: &str) -> Result<()> {
    if passcode.len() != PASSCODE_LENGTH {
        return Err(LifeHubError::Validation(format!(
            "Passcode must be exactly {} digits",
            PASSCODE_LENGTH
        )));
    }
    if !passcode.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LifeHubError::Validation(
            "Passcode must contain digits only".into(),
        ));
    }
    Ok(())
}

/// Digest a passcode with Argon2id under a fresh random salt.
pub fn hash_passcode(passcode: &str, params: PasscodeKdfParams) -> Result<PasscodeDigest> {
    validate_passcode(passcode)?;

    let mut salt = vec![0u8; SALT_SIZE];
    rand::rng().fill_bytes(&mut salt);

    let hash = argon2_digest(passcode, &salt, params)?;
    Ok(PasscodeDigest::Argon2id { salt, hash, params })
}

/// Recompute the digest of `passcode` the same way `digest` was produced
/// and compare in constant time.
///
/// Malformed input is a mismatch, not an error.
pub fn verify_passcode(passcode: &str, digest: &PasscodeDigest) -> Result<bool> {
    if validate_passcode(passcode).is_err() {
        return Ok(false);
    }

    let mut candidate = match digest {
        PasscodeDigest::Argon2id { salt, params, .. } => argon2_digest(passcode, salt, *params)?,
        PasscodeDigest::Sha256 { .. } => sha256_digest(passcode),
    };

    let expected = match digest {
        PasscodeDigest::Argon2id { hash, .. } | PasscodeDigest::Sha256 { hash } => hash,
    };

    let matches = candidate.len() == expected.len()
        && bool::from(candidate.as_slice().ct_eq(expected.as_slice()));
    candidate.zeroize();
    Ok(matches)
}

pub fn sha256_digest(passcode: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(passcode.as_bytes());
    hasher.finalize().to_vec()
}

fn argon2_digest(passcode: &str, salt: &[u8], params: PasscodeKdfParams) -> Result<Vec<u8>> {
    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(DIGEST_LEN),
    )
    .map_err(|e| LifeHubError::Encryption(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = vec![0u8; DIGEST_LEN];
    argon2
        .hash_password_into(passcode.as_bytes(), salt, &mut out)
        .map_err(|e| LifeHubError::Encryption(format!("Passcode digest failed: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
pub(crate) fn fast_params() -> PasscodeKdfParams {
    PasscodeKdfParams {
        memory_kib: 256,
        iterations: 1,
        parallelism: 1,
    }
}
