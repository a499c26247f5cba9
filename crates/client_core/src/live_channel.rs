//! Persistent websocket connection to the chat hub.
//!
//! Inbound chat frames are validated and handed to a single consumer in
//! arrival order. Outbound sends are fire-and-forget: no acknowledgement and
//! no retry. Reconnection is left to the caller.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::{SinkExt, StreamExt};
use shared::{
    domain::ConversationId,
    protocol::{ClientFrame, ServerFrame},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::{config::ClientSettings, error::ChannelError, session::Session, types::InboundMessage};

/// Destination for outbound chat messages. Fire-and-forget: `Ok` means the
/// message was queued, not delivered.
pub trait OutboundSink: Send + Sync {
    fn send(&self, conversation_id: ConversationId, content: String) -> Result<(), ChannelError>;
}

/// Stand-in used while no live channel is attached.
pub struct MissingOutboundSink;

impl OutboundSink for MissingOutboundSink {
    fn send(&self, _conversation_id: ConversationId, _content: String) -> Result<(), ChannelError> {
        Err(ChannelError::Closed)
    }
}

enum Outbound {
    Frame(ClientFrame),
    Close,
}

/// Receiving half of the live channel. Owning it is what makes a consumer
/// the single inbound handler.
pub struct InboundEvents {
    receiver: mpsc::Receiver<InboundMessage>,
    torn_down: Arc<AtomicBool>,
}

impl InboundEvents {
    pub(crate) fn new(receiver: mpsc::Receiver<InboundMessage>, torn_down: Arc<AtomicBool>) -> Self {
        Self {
            receiver,
            torn_down,
        }
    }

    /// Next inbound message, or `None` once the connection has ended or
    /// been closed locally. Nothing queued is delivered after a close.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        if self.torn_down.load(Ordering::Acquire) {
            return None;
        }
        let message = self.receiver.recv().await?;
        if self.torn_down.load(Ordering::Acquire) {
            return None;
        }
        Some(message)
    }
}

pub struct LiveChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
    torn_down: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl LiveChannel {
    pub async fn connect(
        settings: &ClientSettings,
        session: &Session,
    ) -> Result<(Self, InboundEvents), ChannelError> {
        let url = settings.live_channel_url(session.token())?;
        let (ws_stream, _) =
            connect_async(url.as_str())
                .await
                .map_err(|source| ChannelError::Connect {
                    server_url: settings.server_url.clone(),
                    source: Box::new(source),
                })?;
        info!(server_url = %settings.server_url, user_id = %session.user_id(), "live channel: connected");

        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(settings.event_capacity());
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let torn_down = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match ServerFrame::parse(&text) {
                        Ok(ServerFrame::ChatMessage(frame)) => {
                            if inbound_tx.send(InboundMessage::from(frame)).await.is_err() {
                                break;
                            }
                        }
                        Ok(ServerFrame::Unhandled { kind }) => {
                            debug!(kind = %kind, "live channel: ignoring frame for other subscribers");
                        }
                        Err(err) => warn!(%err, "live channel: rejected malformed frame"),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "live channel: receive failed");
                        break;
                    }
                }
            }
            info!("live channel: inbound stream ended");
        });

        let writer = tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                let frame = match outbound {
                    Outbound::Frame(frame) => frame,
                    Outbound::Close => break,
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(%err, "live channel: failed to encode outbound frame");
                        continue;
                    }
                };
                if let Err(err) = ws_writer.send(WsMessage::Text(text)).await {
                    warn!(%err, "live channel: send failed, dropping frame");
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let inbound = InboundEvents::new(inbound_rx, Arc::clone(&torn_down));
        Ok((
            Self {
                outbound: outbound_tx,
                torn_down,
                reader,
                writer,
            },
            inbound,
        ))
    }

    pub fn is_closed(&self) -> bool {
        self.torn_down.load(Ordering::Acquire) || self.writer.is_finished()
    }

    /// Closes the connection. No inbound message is delivered afterwards.
    pub fn close(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.reader.abort();
        let _ = self.outbound.send(Outbound::Close);
        info!("live channel: closed");
    }
}

impl OutboundSink for LiveChannel {
    fn send(&self, conversation_id: ConversationId, content: String) -> Result<(), ChannelError> {
        if self.torn_down.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        let frame = ClientFrame::ChatMessage {
            conversation_id,
            content,
        };
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| ChannelError::Closed)
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "tests/live_channel_tests.rs"]
mod tests;
