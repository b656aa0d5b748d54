pub mod attachment_sync;
pub mod history;
pub mod turn_lock;

use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::models::internal::{Message, NewMessage, Role, TurnRequest};
use crate::services::provider_gateway::{
    CompletionRequest, GatewayError, GenerationParams, HistoryTurn, ProviderGateway,
};
use crate::storage::attachment_repository::AttachmentRepository;
use crate::storage::blob_store::BlobStore;
use crate::storage::repository::{ConversationRepository, RepositoryError};

pub use attachment_sync::{resolved_ids, AttachmentSynchronizer, SyncError, UploadOutcome};
pub use history::HistoryBuilder;
pub use turn_lock::TurnLocks;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Chat not found: {0}")]
    ChatNotFound(Uuid),
    #[error("Invalid turn: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("Failed to get a reply from the provider: {0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub system_prompt: String,
    pub params: GenerationParams,
    pub serialize_chat_turns: bool,
    pub dedupe_current_turn: bool,
}

/// Runs one chat turn: persist, sync attachments, complete, persist the reply.
pub struct ConversationOrchestrator {
    chats: Arc<dyn ConversationRepository>,
    attachments: Arc<dyn AttachmentRepository>,
    gateway: Arc<dyn ProviderGateway>,
    sync: AttachmentSynchronizer,
    history: HistoryBuilder,
    params: GenerationParams,
    locks: Option<TurnLocks>,
}

impl ConversationOrchestrator {
    pub fn new(
        chats: Arc<dyn ConversationRepository>,
        attachments: Arc<dyn AttachmentRepository>,
        blobs: Arc<dyn BlobStore>,
        gateway: Arc<dyn ProviderGateway>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            sync: AttachmentSynchronizer::new(attachments.clone(), blobs, gateway.clone()),
            history: HistoryBuilder::new(settings.system_prompt)
                .skip_current(settings.dedupe_current_turn),
            params: settings.params,
            locks: settings.serialize_chat_turns.then(TurnLocks::new),
            chats,
            attachments,
            gateway,
        }
    }

    pub fn synchronizer(&self) -> &AttachmentSynchronizer {
        &self.sync
    }

    /// Persists the user turn and returns the persisted assistant reply.
    ///
    /// The user message survives a failed completion; no assistant message is written then.
    pub async fn submit_turn(&self, request: TurnRequest) -> Result<Message, TurnError> {
        if request.content.trim().is_empty() && request.attachment_uids.is_empty() {
            return Err(TurnError::InvalidInput(
                "A turn needs content or at least one attachment".to_string(),
            ));
        }
        if request.role == Role::System {
            return Err(TurnError::InvalidInput(
                "System turns cannot be submitted".to_string(),
            ));
        }

        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(request.chat_uid).await),
            None => None,
        };

        let chat_uid = request.chat_uid;
        if self.chats.find_chat(chat_uid).await?.is_none() {
            return Err(TurnError::ChatNotFound(chat_uid));
        }

        let attachment_uids = dedup_preserving_order(&request.attachment_uids);
        tracing::info!(
            "Turn started in chat {} with {} attachment(s)",
            chat_uid,
            attachment_uids.len()
        );

        // Step 1: persist the user turn and link its attachments
        let user_message = self
            .chats
            .create_message(NewMessage {
                uid: request.message_uid.unwrap_or_else(Uuid::new_v4),
                chat_uid,
                role: request.role,
                content: request.content,
            })
            .await?;

        if !attachment_uids.is_empty() {
            if let Err(e) = self
                .attachments
                .associate(&attachment_uids, chat_uid, user_message.uid)
                .await
            {
                tracing::warn!(
                    "Failed to associate attachments with message {}: {}",
                    user_message.uid,
                    e
                );
            }
        }

        // Step 2: make attachments provider-visible
        let outcomes = self.sync.resolve(&attachment_uids).await;
        let file_ids = resolved_ids(&outcomes);
        if file_ids.len() < outcomes.len() {
            tracing::warn!(
                "{} of {} attachment(s) in message {} are not provider-visible",
                outcomes.len() - file_ids.len(),
                outcomes.len(),
                user_message.uid
            );
        }

        // Step 3: rebuild history
        let stored = self.chats.list_messages(chat_uid).await?;
        let messages = self.history.build(
            &stored,
            user_message.uid,
            HistoryTurn {
                role: user_message.role,
                content: user_message.content.clone(),
                file_ids,
            },
        );

        // Step 4: completion
        let started = Instant::now();
        let reply = self
            .gateway
            .complete(CompletionRequest {
                messages,
                params: self.params.clone(),
            })
            .await;
        let latency_ms = started.elapsed().as_millis();

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    "Completion failed for message {} in chat {} after {}ms: {}",
                    user_message.uid,
                    chat_uid,
                    latency_ms,
                    e
                );
                return Err(TurnError::Gateway(e));
            }
        };

        if reply.role != Role::Assistant.as_str() {
            tracing::debug!("Provider answered with role '{}'", reply.role);
        }

        let assistant = self
            .chats
            .create_message(NewMessage {
                uid: Uuid::new_v4(),
                chat_uid,
                role: Role::Assistant,
                content: reply.content,
            })
            .await?;

        tracing::info!(
            "Turn completed in chat {} ({}ms): {} -> {}",
            chat_uid,
            latency_ms,
            user_message.uid,
            assistant.uid
        );

        Ok(assistant)
    }
}

fn dedup_preserving_order(uids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(uids.len());
    uids.iter().copied().filter(|uid| seen.insert(*uid)).collect()
}
