//! Frames exchanged over the persistent channel.
//!
//! Every frame is a JSON text message of the form `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::entities::{ConversationId, Message};
use crate::error::TransportResult;

/// Frames sent from the client to the server.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientFrame {
    Authenticate {
        token: String,
    },
    SendMessage {
        #[serde(rename = "chatId")]
        chat_id: ConversationId,
        text: String,
    },
}

impl ClientFrame {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientFrame::Authenticate { .. } => "authenticate",
            ClientFrame::SendMessage { .. } => "sendMessage",
        }
    }
}

impl std::fmt::Debug for ClientFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientFrame::Authenticate { .. } => f
                .debug_struct("Authenticate")
                .field("token", &"<redacted>")
                .finish(),
            ClientFrame::SendMessage { chat_id, text } => f
                .debug_struct("SendMessage")
                .field("chat_id", chat_id)
                .field("text", text)
                .finish(),
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Frames pushed from the server to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Message(Message),
    /// An event this client does not handle; carries the event name.
    Unknown(String),
}

impl ServerFrame {
    pub fn parse(text: &str) -> TransportResult<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;
        match raw.event.as_str() {
            "message" => Ok(Self::Message(serde_json::from_value(raw.data)?)),
            _ => Ok(Self::Unknown(raw.event)),
        }
    }
}
