//! Vault-specific error types.
//!
//! Granular enough for the frontend to pick the right message: re-prompt
//! on a bad passcode, show "not found", or tell the user their partner has
//! not finished setting up the vault yet.

use thiserror::Error;

use crate::error::LifeHubError;

#[derive(Error, Debug)]
pub enum VaultError {
    /// The passcode did not match the stored digest.
    #[error("Invalid passcode")]
    InvalidPasscode,

    /// No passcode has been set up on this device for the capsule.
    /// There is no recovery path; the user has to run setup again.
    #[error("Vault not set up")]
    NotSetup,

    /// The vault exists but has not been unlocked in this session.
    #[error("Vault is locked")]
    Locked,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller is not one of the capsule's two parties.
    #[error("Not a party of capsule {0}")]
    NotAParty(String),

    /// Content cannot be sealed until the partner has published a key.
    #[error("Partner has not completed vault setup")]
    PartnerNotReady,

    /// Sealed content names no key this party still holds.
    #[error("No key on this device opens sealed content in capsule {0}")]
    KeyUnavailable(String),

    /// A stored record breaks the item invariants.
    #[error("Vault data is corrupted: {0}")]
    Corrupted(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;

impl VaultError {
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::InvalidPasscode => "INVALID_PASSCODE",
            VaultError::NotSetup => "NOT_SETUP",
            VaultError::Locked => "LOCKED",
            VaultError::Validation(_) => "VALIDATION_ERROR",
            VaultError::NotFound(_) => "NOT_FOUND",
            VaultError::NotAParty(_) => "NOT_A_PARTY",
            VaultError::PartnerNotReady => "PARTNER_NOT_READY",
            VaultError::KeyUnavailable(_) => "KEY_UNAVAILABLE",
            VaultError::Corrupted(_) => "CORRUPTED",
            VaultError::Encryption(_) => "ENCRYPTION_ERROR",
            VaultError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

// ============================================================================
// Conversions to and from the main application error type
// ============================================================================

impl From<VaultError> for LifeHubError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::InvalidPasscode => LifeHubError::InvalidPasscode,
            VaultError::NotSetup => LifeHubError::Validation("Vault not set up".into()),
            VaultError::Locked => LifeHubError::VaultLocked,
            VaultError::Validation(msg) => LifeHubError::Validation(msg),
            VaultError::NotFound(msg) => LifeHubError::NotFound(msg),
            VaultError::NotAParty(capsule) => {
                LifeHubError::Unauthorized(format!("Not a party of capsule {}", capsule))
            }
            VaultError::PartnerNotReady => {
                LifeHubError::Validation("Partner has not completed vault setup".into())
            }
            VaultError::KeyUnavailable(capsule) => LifeHubError::Encryption(format!(
                "No key on this device opens sealed content in capsule {}",
                capsule
            )),
            VaultError::Corrupted(msg) => {
                LifeHubError::Storage(format!("Vault corrupted: {}", msg))
            }
            VaultError::Encryption(msg) => LifeHubError::Encryption(msg),
            VaultError::Storage(msg) => LifeHubError::Storage(msg),
        }
    }
}

/// Collaborator failures surfacing inside vault operations.
impl From<LifeHubError> for VaultError {
    fn from(err: LifeHubError) -> Self {
        match err {
            LifeHubError::Validation(msg) => VaultError::Validation(msg),
            LifeHubError::NotFound(msg) => VaultError::NotFound(msg),
            LifeHubError::Encryption(msg) => VaultError::Encryption(msg),
            LifeHubError::InvalidPasscode => VaultError::InvalidPasscode,
            LifeHubError::VaultLocked => VaultError::Locked,
            other => VaultError::Storage(other.to_string()),
        }
    }
}

// ============================================================================
// Serialization for the frontend bridge
// ============================================================================

impl serde::Serialize for VaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("VaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_error_to_app_error() {
        let app_err: LifeHubError = VaultError::InvalidPasscode.into();
        assert!(matches!(app_err, LifeHubError::InvalidPasscode));

        let app_err: LifeHubError = VaultError::NotAParty("c1".into()).into();
        assert!(matches!(app_err, LifeHubError::Unauthorized(_)));
    }

    #[test]
    fn test_store_not_found_stays_not_found() {
        let err: VaultError = LifeHubError::NotFound("item i1".into()).into();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[test]
    fn test_vault_error_serialization() {
        let json = serde_json::to_string(&VaultError::InvalidPasscode).unwrap();
        assert!(json.contains("INVALID_PASSCODE"));
        assert!(json.contains("Invalid passcode"));
    }
}
