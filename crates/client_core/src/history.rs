use std::sync::Arc;

use shared::domain::{ConversationId, UserId};
use tracing::debug;

use crate::{api::ChatApi, error::TransportError, types::Message};

/// Pulls the message timeline of one conversation, oldest first.
pub struct HistoryLoader {
    api: Arc<dyn ChatApi>,
    current_user: UserId,
}

impl HistoryLoader {
    pub fn new(api: Arc<dyn ChatApi>, current_user: UserId) -> Self {
        Self { api, current_user }
    }

    pub async fn fetch(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, TransportError> {
        let entries = self.api.fetch_history(conversation_id).await?;
        debug!(
            conversation_id = %conversation_id,
            count = entries.len(),
            "history: fetched snapshot"
        );
        Ok(entries
            .into_iter()
            .map(|entry| {
                Message::tagged(entry.sender, entry.content, entry.timestamp, &self.current_user)
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
