//! Persistent WebSocket channel carrying push events.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parley_config::ChannelConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::entities::ConversationId;
use crate::error::{TransportError, TransportResult};
use crate::events::{ClientFrame, ServerFrame};
use crate::subscription::SubscriberRegistry;

/// Connected channel. Frames are written by a dedicated task; inbound frames are
/// decoded by a single reader task and dispatched to the registry in arrival order.
pub struct SocketChannel {
    outbound: mpsc::UnboundedSender<ClientFrame>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SocketChannel {
    pub async fn connect(
        config: &ChannelConfig,
        subscribers: Arc<SubscriberRegistry>,
    ) -> TransportResult<Self> {
        let (stream, _response) =
            tokio::time::timeout(config.connect_timeout(), connect_async(config.url.as_str()))
                .await
                .map_err(|_| {
                    TransportError::network(format!(
                        "timed out connecting to {} after {}s",
                        config.url, config.connect_timeout_seconds
                    ))
                })??;

        info!(url = %config.url, "channel connected");

        let (mut sink, mut source) = stream.split();
        let (outbound, mut pending) = mpsc::unbounded_channel::<ClientFrame>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = pending.recv().await {
                let event = frame.event_name();
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(%error, event, "failed to encode channel frame");
                        continue;
                    }
                };

                if let Err(error) = sink.send(WsMessage::Text(text)).await {
                    warn!(%error, event, "failed to write channel frame");
                    break;
                }
                debug!(event, "channel frame sent");
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(next) = source.next().await {
                match next {
                    Ok(WsMessage::Text(text)) => dispatch_text(&subscribers, &text),
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "channel read failed");
                        break;
                    }
                }
            }
            info!("channel disconnected");
        });

        Ok(Self {
            outbound,
            reader,
            writer,
        })
    }

    /// Queue an `authenticate` frame. The channel counts as ready once the frame
    /// is queued on an open socket; the server protocol defines no acknowledgment.
    pub fn authenticate(&self, token: &str) -> TransportResult<()> {
        self.emit(ClientFrame::Authenticate {
            token: token.to_owned(),
        })
    }

    /// Queue a `sendMessage` frame. `RemoteTransport::send` persists over HTTP
    /// instead; this is for callers that relay through the socket.
    pub fn send_message(&self, chat_id: &ConversationId, text: &str) -> TransportResult<()> {
        self.emit(ClientFrame::SendMessage {
            chat_id: chat_id.clone(),
            text: text.to_owned(),
        })
    }

    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed() && !self.reader.is_finished()
    }

    fn emit(&self, frame: ClientFrame) -> TransportResult<()> {
        if !self.is_open() {
            return Err(TransportError::network("channel closed"));
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::network("channel closed"))
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl std::fmt::Debug for SocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketChannel")
            .field("open", &self.is_open())
            .finish()
    }
}

fn dispatch_text(subscribers: &SubscriberRegistry, text: &str) {
    match ServerFrame::parse(text) {
        Ok(ServerFrame::Message(message)) => {
            let delivered = subscribers.dispatch(&message);
            debug!(
                message = %message.id,
                conversation = %message.chat_id,
                delivered,
                "push message received"
            );
        }
        Ok(ServerFrame::Unknown(event)) => debug!(event, "ignoring unhandled channel event"),
        Err(error) => warn!(%error, "dropping malformed channel frame"),
    }
}
