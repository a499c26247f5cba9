use shared::{
    domain::{ConversationId, Timestamp, UserId},
    protocol::ChatMessageFrame,
};

/// A chat message delivered by the live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub content: String,
    pub timestamp: Timestamp,
}

impl From<ChatMessageFrame> for InboundMessage {
    fn from(frame: ChatMessageFrame) -> Self {
        Self {
            conversation_id: frame.conversation_id,
            sender: frame.from,
            content: frame.content,
            timestamp: frame.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    Mine,
    Theirs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: UserId,
    pub content: String,
    pub timestamp: Timestamp,
    pub origin: MessageOrigin,
}

impl Message {
    pub fn tagged(
        sender: UserId,
        content: String,
        timestamp: Timestamp,
        current_user: &UserId,
    ) -> Self {
        let origin = if &sender == current_user {
            MessageOrigin::Mine
        } else {
            MessageOrigin::Theirs
        };
        Self {
            sender,
            content,
            timestamp,
            origin,
        }
    }

    pub fn from_inbound(event: &InboundMessage, current_user: &UserId) -> Self {
        Self::tagged(
            event.sender.clone(),
            event.content.clone(),
            event.timestamp,
            current_user,
        )
    }

    pub fn is_mine(&self) -> bool {
        self.origin == MessageOrigin::Mine
    }

    /// Two deliveries of the same message (history row, live push, echo)
    /// agree on sender, timestamp and content.
    pub fn same_delivery(&self, other: &Message) -> bool {
        self.timestamp == other.timestamp
            && self.sender == other.sender
            && self.content == other.content
    }
}
