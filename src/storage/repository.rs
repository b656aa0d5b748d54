use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{prelude::*, QueryOrder, QuerySelect, Set, SqlErr};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::internal::{Attachment, Chat, Message, NewMessage, Role};
use crate::storage::attachment_repository::AttachmentRepository;
use crate::storage::entities::{chats, messages};
use crate::storage::timestamps;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

// ============================================
// TRAIT DEFINITION - with Send + Sync bounds
// ============================================

/// Append-only store of chats and their messages.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create_chat(&self, uid: Uuid, title: &str) -> Result<Chat, RepositoryError>;

    async fn find_chat(&self, uid: Uuid) -> Result<Option<Chat>, RepositoryError>;

    /// Newest first.
    async fn list_chats(&self) -> Result<Vec<Chat>, RepositoryError>;

    async fn create_message(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    /// Ascending by creation time, attachments joined.
    async fn list_messages(&self, chat_uid: Uuid) -> Result<Vec<Message>, RepositoryError>;

    async fn count_messages(&self, chat_uid: Uuid) -> Result<u64, RepositoryError>;
}

// ============================================
// IMPLEMENTATION STRUCT
// ============================================
pub struct SeaOrmConversationRepository {
    db: DatabaseConnection,
    attachments: Arc<dyn AttachmentRepository>,
}

impl SeaOrmConversationRepository {
    pub fn new(db: DatabaseConnection, attachments: Arc<dyn AttachmentRepository>) -> Self {
        Self { db, attachments }
    }

    async fn chat_exists(&self, uid: Uuid) -> Result<bool, RepositoryError> {
        let found = chats::Entity::find_by_id(uid.to_string())
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }

    async fn last_message_time(
        &self,
        chat_uid: Uuid,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let last = messages::Entity::find()
            .filter(messages::Column::ChatUid.eq(chat_uid.to_string()))
            .order_by_desc(messages::Column::CreatedAt)
            .one(&self.db)
            .await?;

        last.map(|m| parse_timestamp(&m.created_at)).transpose()
    }
}

// ============================================
// TRAIT IMPLEMENTATION
// ============================================
#[async_trait]
impl ConversationRepository for SeaOrmConversationRepository {
    async fn create_chat(&self, uid: Uuid, title: &str) -> Result<Chat, RepositoryError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(RepositoryError::InvalidInput(
                "Chat title must not be empty".to_string(),
            ));
        }
        if self.chat_exists(uid).await? {
            return Err(RepositoryError::Conflict(format!("Chat {} already exists", uid)));
        }

        let created_at = timestamps::now();
        let chat = chats::ActiveModel {
            uid: Set(uid.to_string()),
            title: Set(title.to_string()),
            created_at: Set(timestamps::format(created_at)),
        };

        let model = chat
            .insert(&self.db)
            .await
            .map_err(|e| constraint_error(e, format!("Chat {}", uid)))?;
        tracing::info!("Created chat: {}", uid);

        Chat::try_from(model)
    }

    async fn find_chat(&self, uid: Uuid) -> Result<Option<Chat>, RepositoryError> {
        chats::Entity::find_by_id(uid.to_string())
            .one(&self.db)
            .await?
            .map(Chat::try_from)
            .transpose()
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, RepositoryError> {
        let rows = chats::Entity::find()
            .select_only()
            .columns([
                chats::Column::Uid,
                chats::Column::Title,
                chats::Column::CreatedAt,
            ])
            .order_by_desc(chats::Column::CreatedAt)
            .order_by_desc(chats::Column::Uid)
            .into_tuple::<(String, String, String)>()
            .all(&self.db)
            .await?;

        rows.into_iter()
            .map(|(uid, title, created_at)| {
                Ok(Chat {
                    uid: parse_uid(&uid)?,
                    title,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        if !self.chat_exists(message.chat_uid).await? {
            return Err(RepositoryError::NotFound(format!(
                "Chat {}",
                message.chat_uid
            )));
        }

        let duplicate = messages::Entity::find_by_id(message.uid.to_string())
            .one(&self.db)
            .await?;
        if duplicate.is_some() {
            return Err(RepositoryError::Conflict(format!(
                "Message {} already exists",
                message.uid
            )));
        }

        // Strictly increasing within a chat so that history order is total.
        let previous = self.last_message_time(message.chat_uid).await?;
        let created_at = timestamps::next_after(previous, Utc::now());

        let model = messages::ActiveModel {
            uid: Set(message.uid.to_string()),
            chat_uid: Set(message.chat_uid.to_string()),
            role: Set(message.role.as_str().to_string()),
            content: Set(message.content),
            created_at: Set(timestamps::format(created_at)),
        };

        let inserted = model.insert(&self.db).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                RepositoryError::NotFound(format!("Chat {}", message.chat_uid))
            }
            _ => constraint_error(e, format!("Message {}", message.uid)),
        })?;
        tracing::debug!(
            "Stored {} message {} in chat {}",
            message.role,
            message.uid,
            message.chat_uid
        );

        Message::try_from(inserted)
    }

    async fn list_messages(&self, chat_uid: Uuid) -> Result<Vec<Message>, RepositoryError> {
        let msg_models = messages::Entity::find()
            .filter(messages::Column::ChatUid.eq(chat_uid.to_string()))
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Uid)
            .all(&self.db)
            .await?;

        let mut messages = msg_models
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        if messages.is_empty() {
            return Ok(messages);
        }

        let message_uids: Vec<Uuid> = messages.iter().map(|m| m.uid).collect();
        let mut by_message: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
        for attachment in self.attachments.list_for_messages(&message_uids).await? {
            if let Some(message_uid) = attachment.message_uid {
                by_message.entry(message_uid).or_default().push(attachment);
            }
        }

        for message in &mut messages {
            message.attachments = by_message.remove(&message.uid).unwrap_or_default();
        }

        Ok(messages)
    }

    async fn count_messages(&self, chat_uid: Uuid) -> Result<u64, RepositoryError> {
        let count = messages::Entity::find()
            .filter(messages::Column::ChatUid.eq(chat_uid.to_string()))
            .count(&self.db)
            .await?;
        Ok(count)
    }
}

// ============================================
// Conversions
// ============================================

/// Turns constraint violations that slip past the pre-insert checks into domain errors.
pub(crate) fn constraint_error(err: DbErr, entity: String) -> RepositoryError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            RepositoryError::Conflict(format!("{} already exists", entity))
        }
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            RepositoryError::NotFound(format!("Parent of {}", entity))
        }
        _ => RepositoryError::DbError(err),
    }
}

pub(crate) fn parse_uid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|_| RepositoryError::Corrupt(format!("malformed uid '{}'", raw)))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    timestamps::parse(raw)
        .ok_or_else(|| RepositoryError::Corrupt(format!("malformed timestamp '{}'", raw)))
}

impl TryFrom<chats::Model> for Chat {
    type Error = RepositoryError;

    fn try_from(model: chats::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            uid: parse_uid(&model.uid)?,
            title: model.title,
            created_at: parse_timestamp(&model.created_at)?,
        })
    }
}

impl TryFrom<messages::Model> for Message {
    type Error = RepositoryError;

    fn try_from(model: messages::Model) -> Result<Self, Self::Error> {
        let role: Role = model
            .role
            .parse()
            .map_err(|e: crate::models::internal::UnknownRole| {
                RepositoryError::Corrupt(e.to_string())
            })?;

        Ok(Self {
            uid: parse_uid(&model.uid)?,
            chat_uid: parse_uid(&model.chat_uid)?,
            role,
            content: model.content,
            created_at: parse_timestamp(&model.created_at)?,
            attachments: Vec::new(),
        })
    }
}
