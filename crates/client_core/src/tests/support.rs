use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use shared::{
    domain::{ConversationId, ConversationKind, Timestamp, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        ClientFrame, ConversationSummary, HistoryEntry, InitiateConversationRequest,
        SemanticSearchHit,
    },
};
use tokio::sync::oneshot;

use crate::{
    api::ChatApi,
    error::{ChannelError, TransportError},
    live_channel::OutboundSink,
};

pub fn ts(raw: &str) -> Timestamp {
    Timestamp::parse(raw).expect("valid timestamp")
}

pub fn summary(id: &str, participants: &[&str], last_message_time: Option<&str>) -> ConversationSummary {
    ConversationSummary {
        id: ConversationId::from(id),
        participants: participants.iter().copied().map(UserId::from).collect(),
        kind: ConversationKind::Direct,
        name: None,
        created_at: None,
        last_message: None,
        last_message_time: last_message_time.map(ts),
        unread_count: 0,
    }
}

pub fn entry(sender: &str, content: &str, timestamp: &str) -> HistoryEntry {
    HistoryEntry {
        sender: UserId::from(sender),
        content: content.to_string(),
        timestamp: ts(timestamp),
    }
}

fn not_found(path: String) -> TransportError {
    TransportError::Status {
        path,
        status: 404,
        error: ApiError::new(ErrorCode::NotFound, "Conversation not found"),
    }
}

/// In-memory server. History fetches can be held back per conversation.
#[derive(Default)]
pub struct FakeChatApi {
    conversations: Mutex<Vec<ConversationSummary>>,
    histories: Mutex<HashMap<ConversationId, Vec<HistoryEntry>>>,
    gates: Mutex<HashMap<ConversationId, oneshot::Receiver<()>>>,
    failing_history: Mutex<HashSet<ConversationId>>,
    created: Mutex<Option<ConversationSummary>>,
    search_hits: Mutex<Vec<SemanticSearchHit>>,
    pub initiated: Mutex<Vec<InitiateConversationRequest>>,
    pub read_acks: Mutex<Vec<ConversationId>>,
    pub searches: Mutex<Vec<(ConversationId, String)>>,
    pub list_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl FakeChatApi {
    pub fn with_conversations(conversations: Vec<ConversationSummary>) -> Self {
        let api = Self::default();
        *api.conversations.lock().expect("lock") = conversations;
        api
    }

    pub fn set_history(&self, conversation_id: &str, entries: Vec<HistoryEntry>) {
        self.histories
            .lock()
            .expect("lock")
            .insert(ConversationId::from(conversation_id), entries);
    }

    /// Holds the next history fetch of `conversation_id` until the returned
    /// sender fires or is dropped.
    pub fn gate_history(&self, conversation_id: &str) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.gates
            .lock()
            .expect("lock")
            .insert(ConversationId::from(conversation_id), gate);
        release
    }

    pub fn fail_history(&self, conversation_id: &str) {
        self.failing_history
            .lock()
            .expect("lock")
            .insert(ConversationId::from(conversation_id));
    }

    /// The conversation the server hands out for the next initiation.
    pub fn will_create(&self, conversation: ConversationSummary) {
        *self.created.lock().expect("lock") = Some(conversation);
    }

    pub fn set_search_hits(&self, hits: Vec<SemanticSearchHit>) {
        *self.search_hits.lock().expect("lock") = hits;
    }

    pub fn initiated(&self) -> Vec<InitiateConversationRequest> {
        self.initiated.lock().expect("lock").clone()
    }

    pub fn read_acks(&self) -> Vec<ConversationId> {
        self.read_acks.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.conversations.lock().expect("lock").clone())
    }

    async fn fetch_history(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<HistoryEntry>, TransportError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().expect("lock").remove(conversation_id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self
            .failing_history
            .lock()
            .expect("lock")
            .contains(conversation_id)
        {
            return Err(not_found(format!("chat/history/{conversation_id}")));
        }
        Ok(self
            .histories
            .lock()
            .expect("lock")
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn initiate_conversation(
        &self,
        request: &InitiateConversationRequest,
    ) -> Result<ConversationId, TransportError> {
        self.initiated.lock().expect("lock").push(request.clone());
        let created = self
            .created
            .lock()
            .expect("lock")
            .take()
            .ok_or_else(|| TransportError::Unavailable("no conversation scripted".into()))?;
        let conversation_id = created.id.clone();
        let mut conversations = self.conversations.lock().expect("lock");
        conversations.retain(|known| known.id != conversation_id);
        conversations.insert(0, created);
        Ok(conversation_id)
    }

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<(), TransportError> {
        self.read_acks
            .lock()
            .expect("lock")
            .push(conversation_id.clone());
        Ok(())
    }

    async fn friends_without_conversation(&self) -> Result<Vec<UserId>, TransportError> {
        Ok(vec![UserId::from("dave")])
    }

    async fn friends(&self) -> Result<Vec<UserId>, TransportError> {
        Ok(vec![UserId::from("bob"), UserId::from("dave")])
    }

    async fn semantic_search(
        &self,
        conversation_id: &ConversationId,
        query: &str,
    ) -> Result<Vec<SemanticSearchHit>, TransportError> {
        self.searches
            .lock()
            .expect("lock")
            .push((conversation_id.clone(), query.to_string()));
        Ok(self.search_hits.lock().expect("lock").clone())
    }
}

/// Outbound sink that keeps every submitted frame.
#[derive(Default)]
pub struct RecordingSink {
    pub frames: Mutex<Vec<ClientFrame>>,
}

impl RecordingSink {
    pub fn frames(&self) -> Vec<ClientFrame> {
        self.frames.lock().expect("lock").clone()
    }
}

impl OutboundSink for RecordingSink {
    fn send(&self, conversation_id: ConversationId, content: String) -> Result<(), ChannelError> {
        self.frames
            .lock()
            .expect("lock")
            .push(ClientFrame::ChatMessage {
                conversation_id,
                content,
            });
        Ok(())
    }
}
