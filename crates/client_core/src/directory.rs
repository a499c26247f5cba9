//! Ordered set of conversation summaries shown in the sidebar.
//!
//! Entries are only ever created by a full list fetch; live events update
//! existing entries and move them to the front but never add new ones.

use std::collections::HashSet;

use shared::{
    domain::{ConversationId, ConversationKind, Timestamp, UserId},
    protocol::ConversationSummary,
};

use crate::types::InboundMessage;

pub const PREVIEW_MAX_CHARS: usize = 30;
const PREVIEW_ELLIPSIS: &str = "...";
const UNKNOWN_PARTICIPANT: &str = "Unknown";
const DEFAULT_GROUP_NAME: &str = "Group Chat";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationDirectory {
    entries: Vec<ConversationSummary>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every entry with the server's list, most recently active first.
    pub fn upsert_from_fetch(&mut self, list: Vec<ConversationSummary>) {
        let mut seen = HashSet::new();
        let mut entries: Vec<ConversationSummary> = list
            .into_iter()
            .filter(|summary| seen.insert(summary.id.clone()))
            .collect();
        entries.sort_by_key(|summary| std::cmp::Reverse(recency(summary)));
        self.entries = entries;
    }

    /// Applies a live message to its conversation and moves that conversation
    /// to the front. Returns `false` when the conversation is not known yet.
    pub fn apply_inbound_event(
        &mut self,
        event: &InboundMessage,
        current_user: &UserId,
        active: Option<&ConversationId>,
    ) -> bool {
        let Some(index) = self.position(&event.conversation_id) else {
            return false;
        };

        let mut entry = self.entries.remove(index);
        entry.last_message = Some(preview(&event.content));
        entry.last_message_time = Some(event.timestamp);
        if active != Some(&event.conversation_id) && &event.sender != current_user {
            entry.unread_count = entry.unread_count.saturating_add(1);
        }
        self.entries.insert(0, entry);
        true
    }

    /// Resets the unread counter. Order is left untouched.
    pub fn mark_read(&mut self, conversation_id: &ConversationId) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| &entry.id == conversation_id)
        {
            Some(entry) if entry.unread_count != 0 => {
                entry.unread_count = 0;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, conversation_id: &ConversationId) -> Option<&ConversationSummary> {
        self.entries.iter().find(|entry| &entry.id == conversation_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[ConversationSummary] {
        &self.entries
    }

    fn position(&self, conversation_id: &ConversationId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| &entry.id == conversation_id)
    }
}

/// A conversation without messages ranks by when it was created.
fn recency(summary: &ConversationSummary) -> Option<Timestamp> {
    summary.last_message_time.or(summary.created_at)
}

/// Sidebar title for a conversation.
///
/// Direct conversations are named after the other participant; malformed
/// participant lists fall back to the first non-empty participant.
pub fn display_name(summary: &ConversationSummary, current_user: &UserId) -> String {
    match summary.kind {
        ConversationKind::Group => summary
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_GROUP_NAME)
            .to_string(),
        ConversationKind::Direct => {
            let participants = &summary.participants;
            let well_formed = participants.len() == 2 && participants.contains(current_user);
            let peer = if well_formed {
                participants
                    .iter()
                    .find(|participant| *participant != current_user && !participant.is_blank())
            } else {
                None
            };
            peer.or_else(|| participants.iter().find(|participant| !participant.is_blank()))
                .map(ToString::to_string)
                .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string())
        }
    }
}

pub fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_MAX_CHARS) {
        None => content.to_string(),
        Some((cut, _)) => format!("{}{PREVIEW_ELLIPSIS}", &content[..cut]),
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
