use shared::domain::{ConversationId, Timestamp};

use crate::types::Message;

/// Observable phase of the active selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    NoneSelected,
    Loading(ConversationId),
    Ready(ConversationId),
}

#[derive(Debug, Clone)]
enum SelectionState {
    NoneSelected,
    /// History fetch in flight; live messages for the conversation wait here.
    Loading {
        conversation_id: ConversationId,
        buffered: Vec<Message>,
    },
    Ready {
        conversation_id: ConversationId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    Applied,
    /// The response targets a conversation that is no longer selected.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Buffered,
    Duplicate,
    NotActive,
}

/// Message list of the selected conversation.
#[derive(Debug, Clone)]
pub struct ActiveTimeline {
    state: SelectionState,
    messages: Vec<Message>,
}

impl Default for ActiveTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveTimeline {
    pub fn new() -> Self {
        Self {
            state: SelectionState::NoneSelected,
            messages: Vec::new(),
        }
    }

    /// Clears the list and waits for history of `conversation_id`.
    /// Selecting the conversation that is already active does nothing.
    pub fn select(&mut self, conversation_id: ConversationId) -> bool {
        if self.active() == Some(&conversation_id) {
            return false;
        }
        self.messages.clear();
        self.state = SelectionState::Loading {
            conversation_id,
            buffered: Vec::new(),
        };
        true
    }

    pub fn clear_selection(&mut self) {
        self.messages.clear();
        self.state = SelectionState::NoneSelected;
    }

    pub fn active(&self) -> Option<&ConversationId> {
        match &self.state {
            SelectionState::NoneSelected => None,
            SelectionState::Loading {
                conversation_id, ..
            }
            | SelectionState::Ready { conversation_id } => Some(conversation_id),
        }
    }

    pub fn selection(&self) -> Selection {
        match &self.state {
            SelectionState::NoneSelected => Selection::NoneSelected,
            SelectionState::Loading {
                conversation_id, ..
            } => Selection::Loading(conversation_id.clone()),
            SelectionState::Ready { conversation_id } => Selection::Ready(conversation_id.clone()),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Installs a history snapshot for `conversation_id` if it is still the
    /// active selection. Messages that arrived live (buffered while loading,
    /// or already shown) are merged in by timestamp, without duplicates.
    pub fn apply_history(
        &mut self,
        conversation_id: &ConversationId,
        history: Vec<Message>,
    ) -> HistoryOutcome {
        let live = match &mut self.state {
            SelectionState::Loading {
                conversation_id: active,
                buffered,
            } if active == conversation_id => std::mem::take(buffered),
            SelectionState::Ready {
                conversation_id: active,
            } if active == conversation_id => std::mem::take(&mut self.messages),
            _ => return HistoryOutcome::Stale,
        };

        self.messages = merge(history, live);
        self.state = SelectionState::Ready {
            conversation_id: conversation_id.clone(),
        };
        HistoryOutcome::Applied
    }

    /// Ends a failed load: the timeline shows whatever arrived live meanwhile.
    pub fn fail_load(&mut self, conversation_id: &ConversationId) -> bool {
        let live = match &mut self.state {
            SelectionState::Loading {
                conversation_id: active,
                buffered,
            } if active == conversation_id => std::mem::take(buffered),
            _ => return false,
        };

        self.messages = merge(Vec::new(), live);
        self.state = SelectionState::Ready {
            conversation_id: conversation_id.clone(),
        };
        true
    }

    pub fn append_if_active(
        &mut self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> AppendOutcome {
        match &mut self.state {
            SelectionState::Ready {
                conversation_id: active,
            } if active == conversation_id => {
                if self.messages.iter().any(|known| known.same_delivery(&message)) {
                    return AppendOutcome::Duplicate;
                }
                self.messages.push(message);
                AppendOutcome::Appended
            }
            SelectionState::Loading {
                conversation_id: active,
                buffered,
            } if active == conversation_id => {
                if buffered.iter().any(|known| known.same_delivery(&message)) {
                    return AppendOutcome::Duplicate;
                }
                buffered.push(message);
                AppendOutcome::Buffered
            }
            _ => AppendOutcome::NotActive,
        }
    }

    /// Index of the loaded message sent at `timestamp`, compared at
    /// millisecond precision.
    pub fn position_of(&self, timestamp: &Timestamp) -> Option<usize> {
        let wanted = timestamp.timestamp_millis();
        self.messages
            .iter()
            .position(|message| message.timestamp.timestamp_millis() == wanted)
    }
}

fn merge(mut snapshot: Vec<Message>, live: Vec<Message>) -> Vec<Message> {
    for message in live {
        if !snapshot.iter().any(|known| known.same_delivery(&message)) {
            snapshot.push(message);
        }
    }
    // Stable: server order is kept for equal timestamps.
    snapshot.sort_by_key(|message| message.timestamp);
    snapshot
}

#[cfg(test)]
#[path = "tests/timeline_tests.rs"]
mod tests;
