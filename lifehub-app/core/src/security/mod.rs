mod crypto;
mod identity;
mod passcode;

pub use crypto::{decrypt_content, encrypt_content, NONCE_SIZE};
pub use identity::{
    derive_capsule_key, derive_shared_secret, generate_party_identity, load_or_create_identity,
    CapsuleKey, PartyIdentity, IDENTITY_STORAGE_KEY,
};
pub use passcode::{
    hash_passcode, sha256_digest, validate_passcode, verify_passcode, PasscodeDigest,
    PASSCODE_LENGTH,
};

#[cfg(test)]
pub(crate) use passcode::fast_params;
