use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::internal::{Attachment, Chat, Message, Role};

// ==================== REQUEST DTOs ====================

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    /// Client-generated identity; generated by the server when absent
    pub uid: Option<Uuid>,
    pub title: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMessageRequest {
    pub message_uid: Option<Uuid>,
    pub chat_uid: Uuid,
    /// Only `user` is accepted; defaults to `user`
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
    /// Uids of previously staged attachments
    #[serde(default)]
    pub attachments: Vec<Uuid>,
}

/// Multipart body of `POST /api/files`.
#[derive(Debug, ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub document: Vec<u8>,
    pub chat_uid: Option<Uuid>,
    pub message_uid: Option<Uuid>,
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub uid: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<Chat> for ChatResponse {
    fn from(chat: Chat) -> Self {
        Self {
            uid: chat.uid,
            title: chat.title,
            created_at: chat.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub uid: Uuid,
    pub chat_uid: Option<Uuid>,
    pub message_uid: Option<Uuid>,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: i64,
    /// Storage key under the uploads directory
    pub url: String,
    /// Provider file id, present once uploaded
    pub remote_id: Option<String>,
}

impl From<Attachment> for AttachmentResponse {
    fn from(a: Attachment) -> Self {
        Self {
            uid: a.uid,
            chat_uid: a.chat_uid,
            message_uid: a.message_uid,
            name: a.name,
            mime_type: a.mime_type,
            size: a.size,
            url: a.url,
            remote_id: a.remote_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub uid: Uuid,
    pub chat_uid: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentResponse>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            uid: m.uid,
            chat_uid: m.chat_uid,
            role: m.role,
            content: m.content,
            created_at: m.created_at,
            attachments: m.attachments.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessagesResponse {
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}
