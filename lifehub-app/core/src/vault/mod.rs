//! Capsule vault: a secret store shared by exactly two parties.
//!
//! This module provides:
//! - Local passcode gating per capsule (digest kept in device secure storage)
//! - Mutual approval: item content is shown only after both parties approve
//! - Sealing of text content under a key both parties can derive

pub mod access;
pub mod auth;
pub mod capsule;
pub mod content;
pub mod error;
pub mod item;
pub mod manager;

pub use access::VaultAccess;
pub use auth::VaultStatus;
pub use capsule::Capsule;
pub use content::{CapsuleKeySealer, ContentSealer, Opened, PlaintextSealer};
pub use error::{VaultError, VaultResult};
pub use item::{
    ApprovalSide, ContentType, FileRef, ItemStatus, SealedContent, SealingKeys, VaultItem,
    VaultItemRow, VaultItemView, VaultPayload,
};
pub use manager::VaultManager;
