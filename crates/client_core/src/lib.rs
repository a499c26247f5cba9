//! Client-side state synchronization for the chat service.
//!
//! A [`SyncCoordinator`] merges two sources of truth: request/response pulls
//! over HTTP ([`ChatApi`]) and pushes from the hub websocket
//! ([`LiveChannel`]). It owns the [`ConversationDirectory`] and the
//! [`ActiveTimeline`] and reports every change as a [`ClientEvent`].

use shared::domain::ConversationId;

pub mod api;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod history;
pub mod initiator;
pub mod live_channel;
pub mod session;
pub mod timeline;
pub mod types;

pub use api::{ChatApi, HttpChatApi};
pub use config::{load_settings, ClientSettings};
pub use coordinator::SyncCoordinator;
pub use directory::ConversationDirectory;
pub use error::{ChannelError, ClientError, TransportError, ValidationError};
pub use initiator::GroupDraft;
pub use live_channel::{InboundEvents, LiveChannel, OutboundSink};
pub use session::{AuthToken, Session};
pub use timeline::{ActiveTimeline, Selection};
pub use types::{InboundMessage, Message, MessageOrigin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Order, previews or unread counts changed.
    DirectoryChanged,
    SelectionChanged(Option<ConversationId>),
    TimelineChanged {
        conversation_id: ConversationId,
    },
    HistoryFailed {
        conversation_id: ConversationId,
        message: String,
    },
    /// The live channel ended; sends fail until a new one is attached.
    ChannelClosed,
    Error(String),
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
