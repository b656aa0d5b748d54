use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chat {
    pub uid: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted chat turn. `attachments` is only populated by history queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub uid: Uuid,
    pub chat_uid: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub uid: Uuid,
    pub chat_uid: Option<Uuid>,
    pub message_uid: Option<Uuid>,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    /// Absolute location of the stored bytes.
    pub path: String,
    /// Blob key relative to the uploads directory.
    pub url: String,
    /// File id assigned by the provider after a successful upload.
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub uid: Uuid,
    pub chat_uid: Uuid,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub uid: Option<Uuid>,
    pub chat_uid: Option<Uuid>,
    pub message_uid: Option<Uuid>,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub url: String,
}

/// One user turn handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub chat_uid: Uuid,
    /// Client-generated identity of the user message; generated when absent.
    pub message_uid: Option<Uuid>,
    pub role: Role,
    pub content: String,
    pub attachment_uids: Vec<Uuid>,
}
