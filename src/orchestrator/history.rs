use uuid::Uuid;

use crate::models::internal::{Message, Role};
use crate::services::provider_gateway::HistoryTurn;

/// Rebuilds the provider-facing conversation from stored messages.
pub struct HistoryBuilder {
    system_prompt: String,
    skip_current: bool,
}

impl HistoryBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            skip_current: false,
        }
    }

    /// Leave the stored copy of the current message out of the replayed prefix.
    pub fn skip_current(mut self, skip: bool) -> Self {
        self.skip_current = skip;
        self
    }

    /// System instruction, then every stored message in order, then `current`.
    ///
    /// With [`skip_current`](Self::skip_current) the stored message `current_uid`
    /// is not replayed. Attachments that never reached the provider contribute no file id.
    pub fn build(
        &self,
        stored: &[Message],
        current_uid: Uuid,
        current: HistoryTurn,
    ) -> Vec<HistoryTurn> {
        let mut turns = Vec::with_capacity(stored.len() + 2);

        turns.push(HistoryTurn {
            role: Role::System,
            content: self.system_prompt.clone(),
            file_ids: Vec::new(),
        });

        turns.extend(
            stored
                .iter()
                .filter(|m| !self.skip_current || m.uid != current_uid)
                .map(|m| HistoryTurn {
                    role: m.role,
                    content: m.content.clone(),
                    file_ids: m
                        .attachments
                        .iter()
                        .filter_map(|a| a.remote_id.clone())
                        .collect(),
                }),
        );

        turns.push(current);
        turns
    }
}
