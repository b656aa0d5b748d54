use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::internal::Role;

/// Why the provider refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Authentication,
    RateLimited,
    InvalidInput,
    NotFound,
    Server,
    Other,
}

impl ProviderErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimited,
            400 | 413 | 422 => Self::InvalidInput,
            404 => Self::NotFound,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway configuration error: {0}")]
    Configuration(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Provider error ({kind:?}): {status} - {message}")]
    Provider {
        kind: ProviderErrorKind,
        status: u16,
        message: String,
    },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            kind: ProviderErrorKind::from_status(status),
            status,
            message: message.into(),
        }
    }

    /// The request never got a usable answer from the provider.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilePurpose {
    General,
}

impl FilePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilePurpose::General => "general",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileUpload {
    pub bytes: Vec<u8>,
    pub name: String,
    pub mime_type: String,
    pub purpose: FilePurpose,
}

/// Provider-side file object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub purpose: Option<String>,
}

/// One entry of the history replayed to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub sample_count: u32,
    pub profanity_check: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<HistoryTurn>,
    pub params: GenerationParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReply {
    pub role: String,
    pub content: String,
}

/// Remote LLM provider. Every call is a single attempt.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn upload_file(&self, upload: FileUpload) -> Result<RemoteFile, GatewayError>;

    async fn delete_file(&self, remote_id: &str) -> Result<(), GatewayError>;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, GatewayError>;
}
