use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::internal::Attachment;
use crate::services::provider_gateway::{FilePurpose, FileUpload, GatewayError, ProviderGateway};
use crate::storage::attachment_repository::AttachmentRepository;
use crate::storage::blob_store::{BlobError, BlobStore};

/// Failure to make one attachment provider-visible. Never aborts a turn.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Attachment {0} not found")]
    NotFound(Uuid),
    #[error("Attachment lookup failed: {0}")]
    Lookup(String),
    #[error("Failed to read attachment bytes: {0}")]
    Blob(#[from] BlobError),
    #[error("Upload failed: {0}")]
    Upload(#[from] GatewayError),
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub attachment_uid: Uuid,
    pub result: Result<String, SyncError>,
}

/// Remote ids of the successful outcomes, in outcome order.
pub fn resolved_ids(outcomes: &[UploadOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok().cloned())
        .collect()
}

/// Uploads staged attachments to the provider at most once each.
pub struct AttachmentSynchronizer {
    attachments: Arc<dyn AttachmentRepository>,
    blobs: Arc<dyn BlobStore>,
    gateway: Arc<dyn ProviderGateway>,
}

impl AttachmentSynchronizer {
    pub fn new(
        attachments: Arc<dyn AttachmentRepository>,
        blobs: Arc<dyn BlobStore>,
        gateway: Arc<dyn ProviderGateway>,
    ) -> Self {
        Self {
            attachments,
            blobs,
            gateway,
        }
    }

    /// Resolves a provider file id for every uid, uploading concurrently where needed.
    /// One outcome per uid, in the order given.
    pub async fn resolve(&self, uids: &[Uuid]) -> Vec<UploadOutcome> {
        if uids.is_empty() {
            return Vec::new();
        }

        let mut known: HashMap<Uuid, Attachment> = match self.attachments.find_many(uids).await
        {
            Ok(found) => found.into_iter().map(|a| (a.uid, a)).collect(),
            Err(e) => {
                tracing::warn!("Attachment lookup failed for {} uid(s): {}", uids.len(), e);
                let reason = e.to_string();
                return uids
                    .iter()
                    .map(|uid| UploadOutcome {
                        attachment_uid: *uid,
                        result: Err(SyncError::Lookup(reason.clone())),
                    })
                    .collect();
            }
        };

        let tasks = uids.iter().map(|uid| {
            let attachment = known.remove(uid);
            let uid = *uid;
            async move {
                let result = match attachment {
                    Some(attachment) => self.sync_one(attachment).await,
                    None => Err(SyncError::NotFound(uid)),
                };
                match &result {
                    Ok(remote_id) => {
                        tracing::debug!("Attachment {} resolved to remote file {}", uid, remote_id)
                    }
                    Err(e) => tracing::warn!("Attachment {} skipped: {}", uid, e),
                }
                UploadOutcome {
                    attachment_uid: uid,
                    result,
                }
            }
        });

        join_all(tasks).await
    }

    async fn sync_one(&self, attachment: Attachment) -> Result<String, SyncError> {
        if let Some(remote_id) = attachment.remote_id {
            return Ok(remote_id);
        }

        let bytes = self.blobs.read(&attachment.url).await?;
        let remote = self
            .gateway
            .upload_file(FileUpload {
                bytes,
                name: attachment.name.clone(),
                mime_type: attachment.mime_type.clone(),
                purpose: FilePurpose::General,
            })
            .await?;

        match self
            .attachments
            .set_remote_id(attachment.uid, &remote.id)
            .await
        {
            Ok(true) => Ok(remote.id),
            Ok(false) => {
                // Another turn uploaded the same attachment first; keep its id.
                let stored = self
                    .attachments
                    .find_by_uid(attachment.uid)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|a| a.remote_id);

                match stored {
                    Some(stored) if stored != remote.id => {
                        self.discard_remote(&remote.id).await;
                        Ok(stored)
                    }
                    _ => Ok(remote.id),
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Uploaded attachment {} as {} but could not record the id: {}",
                    attachment.uid,
                    remote.id,
                    e
                );
                Ok(remote.id)
            }
        }
    }

    async fn discard_remote(&self, remote_id: &str) {
        if let Err(e) = self.gateway.delete_file(remote_id).await {
            tracing::warn!("Failed to delete duplicate remote file {}: {}", remote_id, e);
        }
    }
}
