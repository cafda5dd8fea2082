//! Wire entities shared by the HTTP and channel adapters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Ids arrive as JSON strings from some endpoints and as numbers from others.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Integer(value) => value.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                string_or_number(deserializer).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(
    /// Identifier of a chat thread, supplied by navigation and read-only to the core.
    ConversationId
);

opaque_id!(
    /// Server-assigned message identifier, unique within a conversation.
    MessageId
);

/// Chat summary returned by `GET /chats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ConversationId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(
        default,
        deserialize_with = "optional_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    pub email: String,
}

/// A chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub chat_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        id: impl Into<MessageId>,
        chat_id: impl Into<ConversationId>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            chat_id: chat_id.into(),
            author: None,
            timestamp: None,
        }
    }

    pub fn with_author(mut self, id: impl Into<String>, email: impl Into<String>) -> Self {
        self.author = Some(Author {
            id: Some(id.into()),
            email: email.into(),
        });
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn author_email(&self) -> Option<&str> {
        self.author.as_ref().map(|author| author.email.as_str())
    }
}

/// Access credential issued after a successful passcode validation.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl Credential {
    pub fn new(access: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: None,
        }
    }

    pub fn with_refresh(mut self, refresh: impl Into<String>) -> Self {
        self.refresh = Some(refresh.into());
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access", &"<redacted>")
            .field("refresh", &self.refresh.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Acknowledgment of an accepted outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    pub message_id: MessageId,
    pub message: Option<Message>,
}

impl From<Message> for SendAck {
    fn from(message: Message) -> Self {
        Self {
            message_id: message.id.clone(),
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversation_id_accepts_numbers_and_strings() {
        let from_number: ConversationId = serde_json::from_value(json!(7)).unwrap();
        let from_text: ConversationId = serde_json::from_value(json!("7")).unwrap();

        assert_eq!(from_number, from_text);
        assert_eq!(from_number.as_str(), "7");
    }

    #[test]
    fn message_decodes_full_payload() {
        let message: Message = serde_json::from_value(json!({
            "id": "m1",
            "text": "hello",
            "chatId": 3,
            "author": { "id": 12, "email": "a@b.com" },
            "timestamp": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(message.id.as_str(), "m1");
        assert_eq!(message.chat_id.as_str(), "3");
        assert_eq!(message.author_email(), Some("a@b.com"));
        assert_eq!(
            message.author.as_ref().and_then(|author| author.id.as_deref()),
            Some("12")
        );
        assert!(message.timestamp.is_some());
    }

    #[test]
    fn message_tolerates_missing_author_and_timestamp() {
        let message: Message =
            serde_json::from_value(json!({ "id": 5, "text": "hi", "chatId": "c1" })).unwrap();

        assert_eq!(message, Message::new("5", "c1", "hi"));
    }

    #[test]
    fn credential_debug_hides_tokens() {
        let credential = Credential::new("secret-access").with_refresh("secret-refresh");
        let rendered = format!("{credential:?}");

        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }

    #[test]
    fn send_ack_takes_server_assigned_id() {
        let ack = SendAck::from(Message::new("srv-9", "c1", "hey"));
        assert_eq!(ack.message_id.as_str(), "srv-9");
    }
}
