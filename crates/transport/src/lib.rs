//! # Parley Transport Crate
//!
//! Adapters between the chat client core and the external chat server: a
//! request/response HTTP client for tokens, chats and message history, and a
//! persistent WebSocket channel that relays pushed messages.
//!
//! ## Architecture
//!
//! - **Entities**: wire models (Message, Chat, Credential, ...)
//! - **Transport**: the trait the core depends on; injected, never global
//! - **HttpApi / SocketChannel**: the concrete collaborators behind `RemoteTransport`
//! - **MemoryTransport**: scripted double (feature `test-support`)

pub mod channel;
pub mod entities;
pub mod error;
pub mod events;
pub mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod remote;
pub mod subscription;

use async_trait::async_trait;

pub use channel::SocketChannel;
pub use entities::{Author, Chat, ConversationId, Credential, Message, MessageId, SendAck};
pub use error::{TransportError, TransportResult};
pub use events::{ClientFrame, ServerFrame};
pub use http::HttpApi;
#[cfg(any(test, feature = "test-support"))]
pub use memory::{CallCounts, MemoryTransport};
pub use remote::RemoteTransport;
pub use subscription::{MessageCallback, SubscriberRegistry, SubscriptionHandle};

/// Operations the client core needs from the server.
///
/// None of these retry on failure; every retry is a caller decision.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a one-time code to `email`.
    async fn request_code(&self, email: &str) -> TransportResult<()>;

    /// Exchange a one-time code for a credential. A wrong or expired code is
    /// reported as [`TransportError::InvalidCode`].
    async fn validate_code(&self, email: &str, code: &str) -> TransportResult<Credential>;

    /// Associate the persistent channel (and subsequent requests) with a credential.
    async fn authenticate_channel(&self, credential: &Credential) -> TransportResult<()>;

    /// Drop any credential attached to outgoing requests.
    fn forget_credential(&self) {}

    /// Register a callback for inbound push messages.
    fn subscribe(&self, on_message: MessageCallback) -> SubscriptionHandle;

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;

    async fn list_chats(&self) -> TransportResult<Vec<Chat>>;

    /// Messages currently known to the server for a conversation, oldest first.
    async fn fetch_history(&self, conversation_id: &ConversationId) -> TransportResult<Vec<Message>>;

    /// Request persistence of an outbound message. The stored message comes back
    /// through the channel or a history refetch, not through this call's caller.
    async fn send(&self, conversation_id: &ConversationId, text: &str) -> TransportResult<SendAck>;
}
