//! Vault item records and their mutual-approval status.
//!
//! Status is never stored. It is computed from the two approval flags every
//! time it is read, so it cannot drift from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vault::error::{VaultError, VaultResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Note,
    Image,
    Document,
    Password,
    Account,
}

impl ContentType {
    /// Image and document items carry a blob reference instead of text.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::Image | Self::Document)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Note => write!(f, "note"),
            Self::Image => write!(f, "image"),
            Self::Document => write!(f, "document"),
            Self::Password => write!(f, "password"),
            Self::Account => write!(f, "account"),
        }
    }
}

/// Externally observable approval status.
///
/// No transition produces a rejected state, so none is modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Visible,
}

/// Which of the two approval flags a caller owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalSide {
    Uploader,
    Partner,
}

/// A file already persisted to blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

/// Hex X25519 public keys a content key was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealingKeys {
    /// Key of the party that sealed the content.
    pub sealer: String,
    /// Key the other party had published at sealing time.
    pub recipient: String,
}

impl SealingKeys {
    pub fn contains(&self, public_key_hex: &str) -> bool {
        self.sealer == public_key_hex || self.recipient == public_key_hex
    }
}

/// Sealed text payload as stored in the item row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedContent {
    pub ciphertext: String,
    /// Hex nonce. Absent (or a non-nonce placeholder) on plaintext rows.
    pub iv: Option<String>,
    /// Absent on plaintext rows and on rows sealed before keys were recorded.
    pub keys: Option<SealingKeys>,
}

impl SealedContent {
    pub fn plaintext(text: &str) -> Self {
        Self {
            ciphertext: text.to_string(),
            iv: None,
            keys: None,
        }
    }
}

/// What an upload carries, depending on its content type.
#[derive(Debug, Clone)]
pub enum VaultPayload {
    Text(String),
    File(FileRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultItem {
    pub id: String,
    pub capsule_id: String,
    pub title: String,
    pub content_type: ContentType,
    pub content: Option<SealedContent>,
    pub file: Option<FileRef>,
    pub uploaded_by: String,
    pub approved_by_uploader: bool,
    pub approved_by_partner: bool,
    pub created_at: DateTime<Utc>,
}

impl VaultItem {
    /// A freshly uploaded item: the uploader has implicitly approved it, the
    /// partner has not.
    pub fn new_pending(
        capsule_id: &str,
        uploaded_by: &str,
        title: &str,
        content_type: ContentType,
        content: Option<SealedContent>,
        file: Option<FileRef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            capsule_id: capsule_id.to_string(),
            title: title.to_string(),
            content_type,
            content,
            file,
            uploaded_by: uploaded_by.to_string(),
            approved_by_uploader: true,
            approved_by_partner: false,
            created_at,
        }
    }

    pub fn status(&self) -> ItemStatus {
        if self.approved_by_uploader && self.approved_by_partner {
            ItemStatus::Visible
        } else {
            ItemStatus::Pending
        }
    }

    pub fn is_visible(&self) -> bool {
        self.status() == ItemStatus::Visible
    }

    pub fn side_of(&self, party_id: &str) -> ApprovalSide {
        if self.uploaded_by == party_id {
            ApprovalSide::Uploader
        } else {
            ApprovalSide::Partner
        }
    }

    pub fn is_approved_by(&self, side: ApprovalSide) -> bool {
        match side {
            ApprovalSide::Uploader => self.approved_by_uploader,
            ApprovalSide::Partner => self.approved_by_partner,
        }
    }

    /// Set one flag. Only ever turns a flag on.
    pub fn approve(&mut self, side: ApprovalSide) {
        match side {
            ApprovalSide::Uploader => self.approved_by_uploader = true,
            ApprovalSide::Partner => self.approved_by_partner = true,
        }
    }

    /// Check the per-type payload rules.
    pub fn validate(&self) -> VaultResult<()> {
        if self.title.trim().is_empty() {
            return Err(VaultError::Validation("Title is required".into()));
        }
        if self.content_type.is_file() {
            if self.file.is_none() {
                return Err(VaultError::Validation(format!(
                    "A {} item requires an uploaded file",
                    self.content_type
                )));
            }
        } else if self.content.is_none() {
            return Err(VaultError::Validation(format!(
                "A {} item requires text content",
                self.content_type
            )));
        }
        Ok(())
    }
}

/// Row shape of the hosted `vault_items` table.
///
/// Rows are converted to [`VaultItem`] at the persistence boundary and
/// rejected if they break the per-type payload rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultItemRow {
    pub id: String,
    pub capsule_id: String,
    pub title: String,
    pub content_type: ContentType,
    pub encrypted_content: Option<String>,
    pub encryption_iv: Option<String>,
    #[serde(default)]
    pub sealer_public_key: Option<String>,
    #[serde(default)]
    pub recipient_public_key: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub file_type: Option<String>,
    pub uploaded_by: String,
    pub approved_by_uploader: bool,
    pub approved_by_partner: bool,
    pub created_at: DateTime<Utc>,
}

impl From<VaultItem> for VaultItemRow {
    fn from(item: VaultItem) -> Self {
        let (encrypted_content, encryption_iv, keys) = match item.content {
            Some(sealed) => (Some(sealed.ciphertext), sealed.iv, sealed.keys),
            None => (None, None, None),
        };
        let (sealer_public_key, recipient_public_key) = match keys {
            Some(keys) => (Some(keys.sealer), Some(keys.recipient)),
            None => (None, None),
        };
        let (file_url, file_name, file_size, file_type) = match item.file {
            Some(file) => (
                Some(file.url),
                Some(file.name),
                Some(file.size),
                Some(file.mime_type),
            ),
            None => (None, None, None, None),
        };

        Self {
            id: item.id,
            capsule_id: item.capsule_id,
            title: item.title,
            content_type: item.content_type,
            encrypted_content,
            encryption_iv,
            sealer_public_key,
            recipient_public_key,
            file_url,
            file_name,
            file_size,
            file_type,
            uploaded_by: item.uploaded_by,
            approved_by_uploader: item.approved_by_uploader,
            approved_by_partner: item.approved_by_partner,
            created_at: item.created_at,
        }
    }
}

impl TryFrom<VaultItemRow> for VaultItem {
    type Error = VaultError;

    fn try_from(row: VaultItemRow) -> VaultResult<Self> {
        let keys = match (row.sealer_public_key, row.recipient_public_key) {
            (Some(sealer), Some(recipient)) => Some(SealingKeys { sealer, recipient }),
            _ => None,
        };
        let content = row.encrypted_content.map(|ciphertext| SealedContent {
            ciphertext,
            iv: row.encryption_iv,
            keys,
        });
        let file = match row.file_url {
            Some(url) => Some(FileRef {
                name: row.file_name.unwrap_or_else(|| "file".to_string()),
                size: row.file_size.unwrap_or(0),
                mime_type: row
                    .file_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                url,
            }),
            None => None,
        };

        let item = VaultItem {
            id: row.id,
            capsule_id: row.capsule_id,
            title: row.title,
            content_type: row.content_type,
            content,
            file,
            uploaded_by: row.uploaded_by,
            approved_by_uploader: row.approved_by_uploader,
            approved_by_partner: row.approved_by_partner,
            created_at: row.created_at,
        };
        item.validate().map_err(|e| {
            VaultError::Corrupted(format!("Row {} rejected: {}", item.id, e))
        })?;
        Ok(item)
    }
}

/// What one party is allowed to see of an item.
///
/// `content` and `file` are only populated once the item is visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultItemView {
    pub id: String,
    pub capsule_id: String,
    pub title: String,
    pub content_type: ContentType,
    pub status: ItemStatus,
    pub uploaded_by: String,
    pub uploaded_by_me: bool,
    pub approved_by_uploader: bool,
    pub approved_by_partner: bool,
    /// The viewer still has to approve this item.
    pub awaiting_my_approval: bool,
    pub content: Option<String>,
    /// Visible text this device holds no key for, e.g. after the app was
    /// reinstalled and the partner has not opened the vault since.
    pub undecryptable: bool,
    pub file: Option<FileRef>,
    pub created_at: DateTime<Utc>,
}

impl VaultItemView {
    /// Metadata-only view. Content is attached separately for visible items.
    pub fn redacted(item: &VaultItem, viewer_id: &str) -> Self {
        let side = item.side_of(viewer_id);
        Self {
            id: item.id.clone(),
            capsule_id: item.capsule_id.clone(),
            title: item.title.clone(),
            content_type: item.content_type,
            status: item.status(),
            uploaded_by: item.uploaded_by.clone(),
            uploaded_by_me: side == ApprovalSide::Uploader,
            approved_by_uploader: item.approved_by_uploader,
            approved_by_partner: item.approved_by_partner,
            awaiting_my_approval: !item.is_approved_by(side),
            content: None,
            undecryptable: false,
            file: None,
            created_at: item.created_at,
        }
    }
}
