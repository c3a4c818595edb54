//! Per-capsule vault access state.

use serde::{Deserialize, Serialize};

/// Where this device stands with one capsule's vault.
///
/// - `NotSetup` → `Unlocked` (after passcode setup)
/// - `Unlocked` → `Locked` (explicit lock, or a fresh process)
/// - `Locked` → `Unlocked` (after the passcode verifies)
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VaultStatus {
    /// No passcode digest exists on this device (first run, or local data lost)
    #[default]
    NotSetup,
    /// A passcode exists but has not been entered in this process
    Locked,
    /// Passcode verified; item contents may be shown
    Unlocked,
}

impl std::fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSetup => write!(f, "NotSetup"),
            Self::Locked => write!(f, "Locked"),
            Self::Unlocked => write!(f, "Unlocked"),
        }
    }
}
