use std::sync::Arc;

use async_trait::async_trait;
use parley_config::ClientConfig;
use tracing::info;

use crate::channel::SocketChannel;
use crate::entities::{Chat, ConversationId, Credential, Message, SendAck};
use crate::error::TransportResult;
use crate::http::HttpApi;
use crate::subscription::{MessageCallback, SubscriberRegistry, SubscriptionHandle};
use crate::Transport;

/// Transport backed by the real server: REST over HTTP plus the WebSocket channel.
#[derive(Debug)]
pub struct RemoteTransport {
    http: HttpApi,
    channel: SocketChannel,
    subscribers: Arc<SubscriberRegistry>,
}

impl RemoteTransport {
    pub async fn connect(config: &ClientConfig) -> TransportResult<Self> {
        let http = HttpApi::new(&config.api)?;
        let subscribers = Arc::new(SubscriberRegistry::new());
        let channel = SocketChannel::connect(&config.channel, Arc::clone(&subscribers)).await?;

        info!(api = %http.base_url(), channel = %config.channel.url, "remote transport ready");

        Ok(Self {
            http,
            channel,
            subscribers,
        })
    }

    pub fn http(&self) -> &HttpApi {
        &self.http
    }

    pub fn channel(&self) -> &SocketChannel {
        &self.channel
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    async fn request_code(&self, email: &str) -> TransportResult<()> {
        self.http.request_code(email).await
    }

    async fn validate_code(&self, email: &str, code: &str) -> TransportResult<Credential> {
        self.http.validate_code(email, code).await
    }

    async fn authenticate_channel(&self, credential: &Credential) -> TransportResult<()> {
        self.http.set_bearer(Some(credential.access.clone()));
        self.channel.authenticate(&credential.access)
    }

    fn forget_credential(&self) {
        self.http.set_bearer(None);
    }

    fn subscribe(&self, on_message: MessageCallback) -> SubscriptionHandle {
        self.subscribers.subscribe(on_message)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers.unsubscribe(handle)
    }

    async fn list_chats(&self) -> TransportResult<Vec<Chat>> {
        self.http.list_chats().await
    }

    async fn fetch_history(&self, conversation_id: &ConversationId) -> TransportResult<Vec<Message>> {
        self.http.fetch_history(conversation_id).await
    }

    async fn send(&self, conversation_id: &ConversationId, text: &str) -> TransportResult<SendAck> {
        let created = self.http.create_message(conversation_id, text).await?;
        Ok(SendAck::from(created))
    }
}
