//! VaultManager - the mutual-approval item store shared by a capsule's two parties.
//!
//! An uploaded item starts pending with only the uploader's approval. Its
//! content becomes readable to both parties once the partner approves too;
//! there is no separate reveal step and no rejection.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::storage::{BlobStore, CapsuleStore, VaultItemStore};
use crate::vault::capsule::Capsule;
use crate::vault::content::ContentSealer;
use crate::vault::error::{VaultError, VaultResult};
use crate::vault::item::{ContentType, VaultItem, VaultItemView, VaultPayload};

pub struct VaultManager {
    items: Arc<dyn VaultItemStore>,
    capsules: Arc<dyn CapsuleStore>,
    blobs: Arc<dyn BlobStore>,
    sealer: Arc<dyn ContentSealer>,
    clock: Arc<dyn Clock>,
}

impl VaultManager {
    pub fn new(
        items: Arc<dyn VaultItemStore>,
        capsules: Arc<dyn CapsuleStore>,
        blobs: Arc<dyn BlobStore>,
        sealer: Arc<dyn ContentSealer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            items,
            capsules,
            blobs,
            sealer,
            clock,
        }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Load a capsule and make sure `party_id` is one of its two parties.
    pub async fn require_party(&self, capsule_id: &str, party_id: &str) -> VaultResult<Capsule> {
        let capsule = self
            .capsules
            .get_capsule(capsule_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("Capsule {}", capsule_id)))?;
        if !capsule.is_party(party_id) {
            warn!("{} is not a party of capsule {}", party_id, capsule_id);
            return Err(VaultError::NotAParty(capsule_id.to_string()));
        }
        Ok(capsule)
    }

    /// Create a pending item approved by its uploader only.
    ///
    /// Text types (note, password, account) need [`VaultPayload::Text`];
    /// image and document need [`VaultPayload::File`] pointing at a blob the
    /// caller has already stored.
    ///
    /// # Errors
    /// `Validation` for an empty title or a payload that does not match the
    /// content type, `NotAParty` if the uploader is not in the capsule.
    pub async fn upload_item(
        &self,
        capsule_id: &str,
        uploader_id: &str,
        title: &str,
        content_type: ContentType,
        payload: VaultPayload,
    ) -> VaultResult<VaultItem> {
        let title = title.trim();
        if title.is_empty() {
            return Err(VaultError::Validation("Title is required".into()));
        }
        self.require_party(capsule_id, uploader_id).await?;

        let (content, file) = match (content_type.is_file(), payload) {
            (false, VaultPayload::Text(text)) => {
                if text.is_empty() {
                    return Err(VaultError::Validation(format!(
                        "A {} item requires text content",
                        content_type
                    )));
                }
                (Some(self.sealer.seal(capsule_id, &text).await?), None)
            }
            (true, VaultPayload::File(file)) => (None, Some(file)),
            (false, VaultPayload::File(_)) => {
                return Err(VaultError::Validation(format!(
                    "A {} item takes text, not a file",
                    content_type
                )))
            }
            (true, VaultPayload::Text(_)) => {
                return Err(VaultError::Validation(format!(
                    "A {} item requires an uploaded file",
                    content_type
                )))
            }
        };

        let item = VaultItem::new_pending(
            capsule_id,
            uploader_id,
            title,
            content_type,
            content,
            file,
            self.clock.now(),
        );
        item.validate()?;
        self.items.insert(&item).await?;

        info!(
            "Uploaded {} item {} to capsule {}",
            content_type, item.id, capsule_id
        );
        Ok(item)
    }

    /// Set the caller's own approval flag.
    ///
    /// The uploader can only ever set `approved_by_uploader`, anyone else in
    /// the capsule only `approved_by_partner`. Re-approving is a no-op.
    pub async fn approve_item(&self, item_id: &str, caller_id: &str) -> VaultResult<VaultItem> {
        let item = self.require_item(item_id).await?;
        self.require_party(&item.capsule_id, caller_id).await?;

        let side = item.side_of(caller_id);
        if item.is_approved_by(side) {
            debug!("Item {} already approved by {:?}", item_id, side);
            return Ok(item);
        }

        let updated = self.items.set_approval(item_id, side).await?;
        if updated.is_visible() {
            info!("Item {} is now visible to both parties", item_id);
        } else {
            info!("Item {} approved by {:?}", item_id, side);
        }
        Ok(updated)
    }

    /// Remove an item and, best-effort, its backing file.
    ///
    /// A file that cannot be removed is logged and left behind; the record is
    /// deleted regardless. `NotFound` is passed through for the caller to
    /// ignore.
    pub async fn delete_item(&self, item_id: &str, capsule_id: &str) -> VaultResult<()> {
        let item = self.require_item(item_id).await?;
        if item.capsule_id != capsule_id {
            return Err(VaultError::NotFound(format!(
                "Vault item {} in capsule {}",
                item_id, capsule_id
            )));
        }

        if let Some(file) = &item.file {
            match self.blobs.path_from_url(&file.url) {
                Some(path) => {
                    if let Err(e) = self.blobs.remove(&path).await {
                        warn!("Failed to remove file {} for item {}: {}", path, item_id, e);
                    }
                }
                None => warn!(
                    "Item {} references a file outside vault storage, leaving it",
                    item_id
                ),
            }
        }

        self.items.delete(item_id).await?;
        info!("Deleted vault item {} from capsule {}", item_id, capsule_id);
        Ok(())
    }

    /// Items of a capsule as `viewer_id` may see them, newest first.
    ///
    /// Pending items carry metadata only. Visible items also carry their
    /// opened content or file reference; content that fails to open is
    /// flagged `undecryptable` rather than failing the whole list.
    pub async fn list_items(
        &self,
        capsule_id: &str,
        viewer_id: &str,
    ) -> VaultResult<Vec<VaultItemView>> {
        self.require_party(capsule_id, viewer_id).await?;

        let mut items = self.items.list_by_capsule(capsule_id).await?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut views = Vec::with_capacity(items.len());
        for item in &items {
            views.push(self.view_of(item, viewer_id).await);
        }
        debug!("Listed {} items for capsule {}", views.len(), capsule_id);
        Ok(views)
    }

    pub async fn get_item(&self, item_id: &str, viewer_id: &str) -> VaultResult<VaultItemView> {
        let item = self.require_item(item_id).await?;
        self.require_party(&item.capsule_id, viewer_id).await?;
        Ok(self.view_of(&item, viewer_id).await)
    }

    async fn require_item(&self, item_id: &str) -> VaultResult<VaultItem> {
        self.items
            .get(item_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("Vault item {}", item_id)))
    }

    async fn view_of(&self, item: &VaultItem, viewer_id: &str) -> VaultItemView {
        let mut view = VaultItemView::redacted(item, viewer_id);
        if !item.is_visible() {
            return view;
        }

        view.file = item.file.clone();
        if let Some(sealed) = &item.content {
            match self.sealer.open(&item.capsule_id, sealed).await {
                Ok(opened) => {
                    if opened.stale {
                        self.reseal(item, &opened.text).await;
                    }
                    view.content = Some(opened.text);
                }
                Err(e) => {
                    warn!("Could not open content of item {}: {}", item.id, e);
                    view.undecryptable = true;
                }
            }
        }
        view
    }

    /// Seal visible text again under the keys published now, so a partner
    /// whose identity changed can read it. Best-effort.
    async fn reseal(&self, item: &VaultItem, text: &str) {
        let result = async {
            let sealed = self.sealer.seal(&item.capsule_id, text).await?;
            self.items.set_content(&item.id, &sealed).await?;
            Ok::<_, VaultError>(())
        }
        .await;

        match result {
            Ok(()) => info!("Resealed item {} under current capsule keys", item.id),
            Err(e) => warn!("Failed to reseal item {}: {}", item.id, e),
        }
    }
}
