//! Conspectator - chat backend that talks to GigaChat about uploaded documents

pub mod api;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;

// Re-export main types for convenience
pub use crate::api::dto::*;
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::models::internal::{
    Attachment, Chat, Message, NewAttachment, NewMessage, Role, TurnRequest,
};
pub use crate::orchestrator::{ConversationOrchestrator, OrchestratorSettings, TurnError};
pub use crate::services::{AttachmentService, GigaChatClient, ProviderGateway};
pub use crate::storage::db::{init_db, init_db_with_pool};
pub use crate::storage::repository::{ConversationRepository, SeaOrmConversationRepository};
