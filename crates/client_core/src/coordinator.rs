//! Routes live events and pull results into the directory and the timeline.
//!
//! All mutations go through one lock and no lock is held across a network
//! call, so a history response and live pushes may interleave. A history
//! response is applied only if its conversation is still selected when it
//! lands; live messages that arrive meanwhile are buffered by the timeline.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use shared::{
    domain::{ConversationId, Timestamp, UserId},
    protocol::{ConversationSummary, SemanticSearchHit},
};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::ChatApi,
    directory::{display_name, ConversationDirectory},
    error::{ClientError, TransportError, ValidationError},
    history::HistoryLoader,
    initiator::{ConversationInitiator, GroupDraft},
    live_channel::{InboundEvents, MissingOutboundSink, OutboundSink},
    session::Session,
    timeline::{ActiveTimeline, AppendOutcome, HistoryOutcome, Selection},
    types::{InboundMessage, Message},
    ClientEvent,
};

#[derive(Default)]
struct SyncState {
    directory: ConversationDirectory,
    timeline: ActiveTimeline,
}

pub struct SyncCoordinator {
    session: Session,
    api: Arc<dyn ChatApi>,
    history: HistoryLoader,
    initiator: ConversationInitiator,
    outbound: RwLock<Arc<dyn OutboundSink>>,
    channel_generation: AtomicU64,
    state: Mutex<SyncState>,
    events: broadcast::Sender<ClientEvent>,
}

impl SyncCoordinator {
    pub fn new(session: Session, api: Arc<dyn ChatApi>, event_capacity: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let current_user = session.user_id().clone();
        Arc::new(Self {
            history: HistoryLoader::new(Arc::clone(&api), current_user.clone()),
            initiator: ConversationInitiator::new(Arc::clone(&api), current_user),
            session,
            api,
            outbound: RwLock::new(Arc::new(MissingOutboundSink)),
            channel_generation: AtomicU64::new(0),
            state: Mutex::new(SyncState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    /// Makes `inbound` the channel's single consumer and routes outbound
    /// sends to `sink`. When the inbound stream ends the channel is treated
    /// as absent.
    pub async fn attach_channel(
        self: &Arc<Self>,
        sink: Arc<dyn OutboundSink>,
        mut inbound: InboundEvents,
    ) -> JoinHandle<()> {
        let generation = self.channel_generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.outbound.write().await = sink;

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                coordinator.handle_inbound(event).await;
            }
            if coordinator.channel_generation.load(Ordering::Acquire) == generation {
                coordinator.detach_channel().await;
            }
        })
    }

    pub async fn detach_channel(&self) {
        *self.outbound.write().await = Arc::new(MissingOutboundSink);
        warn!("sync: live channel absent, sends are disabled");
        self.emit(ClientEvent::ChannelClosed);
    }

    /// Applies one live message: always to the directory, and to the
    /// timeline when it belongs to the selected conversation.
    pub async fn handle_inbound(&self, event: InboundMessage) {
        let current_user = self.session.user_id();
        let (in_directory, appended) = {
            let mut state = self.state.lock().await;
            let active = state.timeline.active().cloned();
            let in_directory =
                state
                    .directory
                    .apply_inbound_event(&event, current_user, active.as_ref());
            let message = Message::from_inbound(&event, current_user);
            let appended = state
                .timeline
                .append_if_active(&event.conversation_id, message);
            (in_directory, appended)
        };

        if in_directory {
            self.emit(ClientEvent::DirectoryChanged);
        } else {
            debug!(
                conversation_id = %event.conversation_id,
                "sync: live message for unknown conversation, waiting for next list fetch"
            );
        }

        match appended {
            AppendOutcome::Appended => self.emit(ClientEvent::TimelineChanged {
                conversation_id: event.conversation_id.clone(),
            }),
            AppendOutcome::Buffered => debug!(
                conversation_id = %event.conversation_id,
                "sync: buffered live message until history lands"
            ),
            AppendOutcome::Duplicate => debug!(
                conversation_id = %event.conversation_id,
                "sync: dropped duplicate delivery"
            ),
            AppendOutcome::NotActive => {}
        }

        let seen_live = matches!(appended, AppendOutcome::Appended | AppendOutcome::Buffered);
        if seen_live && !self.session.is_current_user(&event.sender) {
            let api = Arc::clone(&self.api);
            let conversation_id = event.conversation_id;
            tokio::spawn(async move {
                if let Err(err) = api.mark_read(&conversation_id).await {
                    warn!(conversation_id = %conversation_id, %err, "sync: read acknowledgement failed");
                }
            });
        }
    }

    /// Replaces the directory with the server's conversation list.
    pub async fn refresh_conversations(&self) -> Result<(), TransportError> {
        let list = self.api.list_conversations().await.map_err(|err| {
            warn!(%err, "sync: conversation list fetch failed");
            err
        })?;
        {
            let mut state = self.state.lock().await;
            state.directory.upsert_from_fetch(list);
        }
        self.emit(ClientEvent::DirectoryChanged);
        Ok(())
    }

    /// Makes `conversation_id` the active selection and loads its history.
    pub async fn select(&self, conversation_id: ConversationId) {
        if !self.begin_selection(&conversation_id).await {
            return;
        }
        self.acknowledge_read(&conversation_id).await;
        self.load_history(&conversation_id).await;
    }

    pub async fn clear_selection(&self) {
        self.state.lock().await.timeline.clear_selection();
        self.emit(ClientEvent::SelectionChanged(None));
    }

    pub async fn mark_read(&self, conversation_id: &ConversationId) {
        let changed = self.state.lock().await.directory.mark_read(conversation_id);
        if changed {
            self.emit(ClientEvent::DirectoryChanged);
        }
        self.acknowledge_read(conversation_id).await;
    }

    /// Submits `content` to the live channel for the active conversation.
    /// The message shows up in the timeline once the hub echoes it back.
    pub async fn send_message(&self, content: &str) -> Result<(), ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let conversation_id = self
            .state
            .lock()
            .await
            .timeline
            .active()
            .cloned()
            .ok_or(ValidationError::NoActiveConversation)?;

        let sink = Arc::clone(&*self.outbound.read().await);
        sink.send(conversation_id.clone(), content.to_string())
            .map_err(|err| {
                warn!(conversation_id = %conversation_id, %err, "sync: send dropped");
                ClientError::from(err)
            })
    }

    pub async fn start_direct(&self, peer: &UserId) -> Result<ConversationId, ClientError> {
        let conversation_id = self.initiator.start_direct(peer).await?;
        self.open_initiated(&conversation_id).await;
        Ok(conversation_id)
    }

    pub async fn create_group(&self, draft: &GroupDraft) -> Result<ConversationId, ClientError> {
        let conversation_id = self.initiator.create_group(draft).await?;
        self.open_initiated(&conversation_id).await;
        Ok(conversation_id)
    }

    pub async fn friends_without_conversation(&self) -> Result<Vec<UserId>, TransportError> {
        self.api.friends_without_conversation().await
    }

    pub async fn friends(&self) -> Result<Vec<UserId>, TransportError> {
        self.api.friends().await
    }

    /// Semantic search within the active conversation.
    pub async fn search(&self, query: &str) -> Result<Vec<SemanticSearchHit>, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        let conversation_id = self
            .active_conversation()
            .await
            .ok_or(ValidationError::NoActiveConversation)?;
        Ok(self.api.semantic_search(&conversation_id, query).await?)
    }

    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.state.lock().await.directory.entries().to_vec()
    }

    pub fn display_name(&self, summary: &ConversationSummary) -> String {
        display_name(summary, self.session.user_id())
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.timeline.messages().to_vec()
    }

    pub async fn selection(&self) -> Selection {
        self.state.lock().await.timeline.selection()
    }

    pub async fn active_conversation(&self) -> Option<ConversationId> {
        self.state.lock().await.timeline.active().cloned()
    }

    pub async fn locate_message(&self, timestamp: &Timestamp) -> Option<usize> {
        self.state.lock().await.timeline.position_of(timestamp)
    }

    /// Selects a conversation returned by the initiator, refetching the
    /// directory before its history is loaded. The server may hand back an
    /// existing conversation with unread messages; the refetch must not
    /// leave those counted while it is active.
    async fn open_initiated(&self, conversation_id: &ConversationId) {
        let selected = self.begin_selection(conversation_id).await;
        if let Err(err) = self.refresh_conversations().await {
            self.emit(ClientEvent::Error(format!(
                "failed to refresh conversations after creating {conversation_id}: {err}"
            )));
        }

        let (still_active, cleared) = {
            let mut state = self.state.lock().await;
            let still_active = state.timeline.active() == Some(conversation_id);
            let cleared = still_active && state.directory.mark_read(conversation_id);
            (still_active, cleared)
        };
        if cleared {
            self.emit(ClientEvent::DirectoryChanged);
        }
        if !still_active {
            return;
        }
        self.acknowledge_read(conversation_id).await;
        if selected {
            self.load_history(conversation_id).await;
        }
    }

    async fn begin_selection(&self, conversation_id: &ConversationId) -> bool {
        {
            let mut state = self.state.lock().await;
            if !state.timeline.select(conversation_id.clone()) {
                debug!(conversation_id = %conversation_id, "sync: conversation already active");
                return false;
            }
            state.directory.mark_read(conversation_id);
        }
        info!(conversation_id = %conversation_id, "sync: selected conversation");
        self.emit(ClientEvent::SelectionChanged(Some(conversation_id.clone())));
        self.emit(ClientEvent::DirectoryChanged);
        true
    }

    async fn load_history(&self, conversation_id: &ConversationId) {
        let result = self.history.fetch(conversation_id).await;
        let mut state = self.state.lock().await;
        match result {
            Ok(messages) => match state.timeline.apply_history(conversation_id, messages) {
                HistoryOutcome::Applied => {
                    drop(state);
                    self.emit(ClientEvent::TimelineChanged {
                        conversation_id: conversation_id.clone(),
                    });
                }
                HistoryOutcome::Stale => debug!(
                    conversation_id = %conversation_id,
                    "sync: dropped history for a conversation no longer selected"
                ),
            },
            Err(err) => {
                warn!(conversation_id = %conversation_id, %err, "sync: history load failed");
                let settled = state.timeline.fail_load(conversation_id);
                drop(state);
                if settled {
                    self.emit(ClientEvent::TimelineChanged {
                        conversation_id: conversation_id.clone(),
                    });
                }
                self.emit(ClientEvent::HistoryFailed {
                    conversation_id: conversation_id.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    async fn acknowledge_read(&self, conversation_id: &ConversationId) {
        if let Err(err) = self.api.mark_read(conversation_id).await {
            warn!(conversation_id = %conversation_id, %err, "sync: read acknowledgement failed");
        }
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
