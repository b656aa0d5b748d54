use async_trait::async_trait;
use sea_orm::{prelude::*, sea_query::Expr, QueryOrder, Set};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::internal::{Attachment, NewAttachment};
use crate::storage::entities::{attachments, chats, messages};
use crate::storage::repository::{constraint_error, parse_timestamp, parse_uid, RepositoryError};
use crate::storage::timestamps;

/// Attachment metadata. Bytes live in the blob store.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    async fn create(&self, attachment: NewAttachment) -> Result<Attachment, RepositoryError>;

    async fn find_by_uid(&self, uid: Uuid) -> Result<Option<Attachment>, RepositoryError>;

    /// Known records in the order of `uids`; unknown uids are skipped.
    async fn find_many(&self, uids: &[Uuid]) -> Result<Vec<Attachment>, RepositoryError>;

    async fn list_for_messages(
        &self,
        message_uids: &[Uuid],
    ) -> Result<Vec<Attachment>, RepositoryError>;

    /// Links staged attachments to a message. Returns the number of rows updated.
    async fn associate(
        &self,
        uids: &[Uuid],
        chat_uid: Uuid,
        message_uid: Uuid,
    ) -> Result<u64, RepositoryError>;

    /// Records the provider file id only if none is stored yet.
    /// Returns `false` when another writer got there first.
    async fn set_remote_id(&self, uid: Uuid, remote_id: &str) -> Result<bool, RepositoryError>;

    async fn delete(&self, uid: Uuid) -> Result<(), RepositoryError>;
}

pub struct SeaOrmAttachmentRepository {
    db: DatabaseConnection,
}

impl SeaOrmAttachmentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn ensure_parents(
        &self,
        chat_uid: Option<Uuid>,
        message_uid: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        if let Some(chat_uid) = chat_uid {
            let chat = chats::Entity::find_by_id(chat_uid.to_string())
                .one(&self.db)
                .await?;
            if chat.is_none() {
                return Err(RepositoryError::NotFound(format!("Chat {}", chat_uid)));
            }
        }

        if let Some(message_uid) = message_uid {
            let message = messages::Entity::find_by_id(message_uid.to_string())
                .one(&self.db)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(format!("Message {}", message_uid)))?;

            if let Some(chat_uid) = chat_uid {
                if message.chat_uid != chat_uid.to_string() {
                    return Err(RepositoryError::InvalidInput(format!(
                        "Message {} does not belong to chat {}",
                        message_uid, chat_uid
                    )));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AttachmentRepository for SeaOrmAttachmentRepository {
    async fn create(&self, attachment: NewAttachment) -> Result<Attachment, RepositoryError> {
        if attachment.name.trim().is_empty() {
            return Err(RepositoryError::InvalidInput(
                "Attachment name must not be empty".to_string(),
            ));
        }
        if attachment.size < 0 {
            return Err(RepositoryError::InvalidInput(format!(
                "Attachment size must not be negative, got {}",
                attachment.size
            )));
        }

        let uid = attachment.uid.unwrap_or_else(Uuid::new_v4);
        if self.find_by_uid(uid).await?.is_some() {
            return Err(RepositoryError::Conflict(format!(
                "Attachment {} already exists",
                uid
            )));
        }

        self.ensure_parents(attachment.chat_uid, attachment.message_uid)
            .await?;

        let model = attachments::ActiveModel {
            uid: Set(uid.to_string()),
            chat_uid: Set(attachment.chat_uid.map(|u| u.to_string())),
            message_uid: Set(attachment.message_uid.map(|u| u.to_string())),
            name: Set(attachment.name),
            mime_type: Set(attachment.mime_type),
            size: Set(attachment.size),
            path: Set(attachment.path),
            url: Set(attachment.url),
            remote_id: Set(None),
            created_at: Set(timestamps::format(timestamps::now())),
        };

        let inserted = model
            .insert(&self.db)
            .await
            .map_err(|e| constraint_error(e, format!("Attachment {}", uid)))?;
        tracing::debug!("Stored attachment metadata {}", uid);

        Attachment::try_from(inserted)
    }

    async fn find_by_uid(&self, uid: Uuid) -> Result<Option<Attachment>, RepositoryError> {
        attachments::Entity::find_by_id(uid.to_string())
            .one(&self.db)
            .await?
            .map(Attachment::try_from)
            .transpose()
    }

    async fn find_many(&self, uids: &[Uuid]) -> Result<Vec<Attachment>, RepositoryError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = uids.iter().map(Uuid::to_string).collect();
        let models = attachments::Entity::find()
            .filter(attachments::Column::Uid.is_in(keys))
            .all(&self.db)
            .await?;

        let mut by_uid = HashMap::with_capacity(models.len());
        for model in models {
            let attachment = Attachment::try_from(model)?;
            by_uid.insert(attachment.uid, attachment);
        }

        Ok(uids
            .iter()
            .filter_map(|uid| by_uid.get(uid).cloned())
            .collect())
    }

    async fn list_for_messages(
        &self,
        message_uids: &[Uuid],
    ) -> Result<Vec<Attachment>, RepositoryError> {
        if message_uids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = message_uids.iter().map(Uuid::to_string).collect();
        attachments::Entity::find()
            .filter(attachments::Column::MessageUid.is_in(keys))
            .order_by_asc(attachments::Column::CreatedAt)
            .order_by_asc(attachments::Column::Uid)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Attachment::try_from)
            .collect()
    }

    async fn associate(
        &self,
        uids: &[Uuid],
        chat_uid: Uuid,
        message_uid: Uuid,
    ) -> Result<u64, RepositoryError> {
        if uids.is_empty() {
            return Ok(0);
        }

        self.ensure_parents(Some(chat_uid), Some(message_uid))
            .await?;

        let keys: Vec<String> = uids.iter().map(Uuid::to_string).collect();
        let result = attachments::Entity::update_many()
            .col_expr(
                attachments::Column::ChatUid,
                Expr::value(chat_uid.to_string()),
            )
            .col_expr(
                attachments::Column::MessageUid,
                Expr::value(message_uid.to_string()),
            )
            .filter(attachments::Column::Uid.is_in(keys))
            .exec(&self.db)
            .await?;

        tracing::debug!(
            "Associated {} attachment(s) with message {}",
            result.rows_affected,
            message_uid
        );

        Ok(result.rows_affected)
    }

    async fn set_remote_id(&self, uid: Uuid, remote_id: &str) -> Result<bool, RepositoryError> {
        if remote_id.is_empty() {
            return Err(RepositoryError::InvalidInput(
                "Remote file id must not be empty".to_string(),
            ));
        }

        let result = attachments::Entity::update_many()
            .col_expr(attachments::Column::RemoteId, Expr::value(remote_id))
            .filter(attachments::Column::Uid.eq(uid.to_string()))
            .filter(attachments::Column::RemoteId.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            return Ok(true);
        }

        // Either the row is gone or someone else already recorded an id.
        match self.find_by_uid(uid).await? {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(format!("Attachment {}", uid))),
        }
    }

    async fn delete(&self, uid: Uuid) -> Result<(), RepositoryError> {
        let result = attachments::Entity::delete_by_id(uid.to_string())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(format!("Attachment {}", uid)));
        }

        tracing::debug!("Deleted attachment metadata {}", uid);
        Ok(())
    }
}

impl TryFrom<attachments::Model> for Attachment {
    type Error = RepositoryError;

    fn try_from(model: attachments::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            uid: parse_uid(&model.uid)?,
            chat_uid: model.chat_uid.as_deref().map(parse_uid).transpose()?,
            message_uid: model.message_uid.as_deref().map(parse_uid).transpose()?,
            name: model.name,
            mime_type: model.mime_type,
            size: model.size,
            path: model.path,
            url: model.url,
            remote_id: model.remote_id,
            created_at: parse_timestamp(&model.created_at)?,
        })
    }
}
