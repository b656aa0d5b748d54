use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::internal::{Attachment, NewAttachment};
use crate::services::provider_gateway::ProviderGateway;
use crate::storage::attachment_repository::AttachmentRepository;
use crate::storage::blob_store::{BlobError, BlobStore};
use crate::storage::repository::RepositoryError;

/// Key prefix for uploads that arrive without a chat.
const STAGED_PREFIX: &str = "staged";

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("Attachment not found: {0}")]
    NotFound(String),
    #[error("Invalid upload: {0}")]
    InvalidInput(String),
    #[error("File of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("Blob storage error: {0}")]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// File received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub name: String,
    /// Declared by the client; guessed from the extension when absent.
    pub mime_type: Option<String>,
    pub chat_uid: Option<Uuid>,
    pub message_uid: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct StagingPolicy {
    pub max_bytes: u64,
    /// Lowercase, without the leading dot.
    pub allowed_extensions: Vec<String>,
}

pub struct AttachmentService {
    attachments: Arc<dyn AttachmentRepository>,
    blobs: Arc<dyn BlobStore>,
    gateway: Arc<dyn ProviderGateway>,
    policy: StagingPolicy,
}

impl AttachmentService {
    pub fn new(
        attachments: Arc<dyn AttachmentRepository>,
        blobs: Arc<dyn BlobStore>,
        gateway: Arc<dyn ProviderGateway>,
        policy: StagingPolicy,
    ) -> Self {
        Self {
            attachments,
            blobs,
            gateway,
            policy,
        }
    }

    /// Validates and stores an upload. The result is not yet provider-visible.
    pub async fn stage(&self, file: UploadedFile) -> Result<Attachment, AttachmentError> {
        let size = file.bytes.len() as u64;
        if size == 0 {
            return Err(AttachmentError::InvalidInput("file is empty".to_string()));
        }
        if size > self.policy.max_bytes {
            return Err(AttachmentError::TooLarge {
                size,
                limit: self.policy.max_bytes,
            });
        }

        let name = client_file_name(&file.name)
            .ok_or_else(|| AttachmentError::InvalidInput("file name is missing".to_string()))?;
        let extension = extension_of(&name).ok_or_else(|| {
            AttachmentError::InvalidInput(format!("'{}' has no extension", name))
        })?;
        if !self.policy.allowed_extensions.iter().any(|e| *e == extension) {
            return Err(AttachmentError::InvalidInput(format!(
                "extension '{}' is not allowed (allowed: {})",
                extension,
                self.policy.allowed_extensions.join(", ")
            )));
        }

        let prefix = file
            .chat_uid
            .map(|uid| uid.to_string())
            .unwrap_or_else(|| STAGED_PREFIX.to_string());
        let key = format!("{}/{}.{}", prefix, Uuid::new_v4(), extension);

        let path = self.blobs.resolve(&key)?;
        self.blobs.write(&key, &file.bytes).await?;

        let mime_type = file
            .mime_type
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| mime_for_extension(&extension).to_string());

        let created = self
            .attachments
            .create(NewAttachment {
                uid: None,
                chat_uid: file.chat_uid,
                message_uid: file.message_uid,
                name,
                mime_type,
                size: size as i64,
                path: path.display().to_string(),
                url: key.clone(),
            })
            .await;

        match created {
            Ok(attachment) => {
                tracing::info!(
                    "Staged attachment {} ({} bytes) at {}",
                    attachment.uid,
                    size,
                    key
                );
                Ok(attachment)
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&key).await {
                    tracing::warn!("Failed to remove orphaned blob {}: {}", key, cleanup);
                }
                Err(e.into())
            }
        }
    }

    /// Deletes local bytes and metadata, then the provider copy if one exists.
    pub async fn remove(&self, uid: Uuid) -> Result<(), AttachmentError> {
        let attachment = self
            .attachments
            .find_by_uid(uid)
            .await?
            .ok_or_else(|| AttachmentError::NotFound(uid.to_string()))?;

        match self.blobs.delete(&attachment.url).await {
            Ok(()) => {}
            Err(BlobError::NotFound(key)) => {
                tracing::warn!("Blob {} for attachment {} was already gone", key, uid);
            }
            Err(e) => return Err(e.into()),
        }

        self.attachments.delete(uid).await?;

        if let Some(remote_id) = attachment.remote_id.as_deref() {
            if let Err(e) = self.gateway.delete_file(remote_id).await {
                tracing::warn!(
                    "Failed to delete remote file {} of attachment {}: {}",
                    remote_id,
                    uid,
                    e
                );
            }
        }

        tracing::info!("Removed attachment {}", uid);
        Ok(())
    }

    /// Metadata and bytes of a stored attachment.
    pub async fn fetch(&self, uid: Uuid) -> Result<(Attachment, Vec<u8>), AttachmentError> {
        let attachment = self
            .attachments
            .find_by_uid(uid)
            .await?
            .ok_or_else(|| AttachmentError::NotFound(uid.to_string()))?;

        let bytes = match self.blobs.read(&attachment.url).await {
            Ok(bytes) => bytes,
            Err(BlobError::NotFound(_)) => {
                return Err(AttachmentError::NotFound(format!(
                    "{} (bytes missing locally)",
                    uid
                )))
            }
            Err(e) => return Err(e.into()),
        };

        Ok((attachment, bytes))
    }
}

/// Last path component of a client-supplied name.
fn client_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
