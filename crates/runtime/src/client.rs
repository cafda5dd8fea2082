use std::sync::Arc;
use std::time::Duration;

use parley_auth::{PasscodeFlow, PasscodeSession, TokenStore};
use parley_chats::{SyncEngine, SyncPhase, SyncUpdate};
use parley_config::ClientConfig;
use parley_transport::{Chat, ConversationId, Credential, Message, SendAck, Transport, TransportResult};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};

/// Caller-facing surface of the client core.
///
/// Owns the passcode flow, the credential slot and one sync engine, and keeps a
/// single active conversation. Once a credential is issued the channel is
/// authenticated with it; if that fails the credential is discarded.
pub struct ChatClient<T: ?Sized> {
    transport: Arc<T>,
    tokens: TokenStore,
    credentials: watch::Receiver<Option<Credential>>,
    passcode: PasscodeFlow<T>,
    engine: SyncEngine<T>,
    active: Option<ConversationId>,
    default_conversation: Option<ConversationId>,
    refresh_interval: Option<Duration>,
}

impl<T> ChatClient<T>
where
    T: Transport + ?Sized + 'static,
{
    pub fn new(transport: Arc<T>, config: &ClientConfig) -> Self {
        let tokens = TokenStore::new();
        let passcode =
            PasscodeFlow::new(Arc::clone(&transport), tokens.clone()).with_config(&config.auth);
        let engine = SyncEngine::new(Arc::clone(&transport));
        let credentials = tokens.watch();

        Self {
            transport,
            tokens,
            credentials,
            passcode,
            engine,
            active: None,
            default_conversation: config
                .chat
                .default_conversation
                .as_deref()
                .map(ConversationId::from),
            refresh_interval: config.chat.refresh_interval(),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }

    pub fn passcode(&self) -> &PasscodeSession {
        self.passcode.session()
    }

    pub fn on_credential_issued<F>(&mut self, listener: F)
    where
        F: Fn(&Credential) + Send + Sync + 'static,
    {
        self.passcode.on_credential_issued(listener);
    }

    pub async fn submit_email(&mut self, email: &str) -> Option<Credential> {
        let issued = self.passcode.submit_email(email).await;
        self.finish_login(issued).await
    }

    pub async fn submit_digit(&mut self, index: usize, value: &str) -> Option<Credential> {
        let issued = self.passcode.submit_digit(index, value).await;
        self.finish_login(issued).await
    }

    pub fn backspace(&mut self, index: usize) {
        self.passcode.backspace(index);
    }

    pub async fn submit_code(&mut self) -> Option<Credential> {
        let issued = self.passcode.submit_code().await;
        self.finish_login(issued).await
    }

    pub async fn recheck_code(&mut self) -> Option<Credential> {
        let issued = self.passcode.recheck().await;
        self.finish_login(issued).await
    }

    pub fn clear_expired_flash(&mut self) -> bool {
        self.passcode.clear_expired_flash()
    }

    async fn finish_login(&mut self, issued: Option<Credential>) -> Option<Credential> {
        let credential = issued?;
        match self.follow_token_store().await {
            Ok(()) => Some(credential),
            Err(_) => None,
        }
    }

    /// Adopt a credential obtained earlier, skipping the passcode flow.
    pub async fn restore_credential(&mut self, credential: Credential) -> TransportResult<()> {
        self.tokens.set(credential);
        self.follow_token_store().await
    }

    /// Authenticate the channel with a credential newly placed in the token store.
    async fn follow_token_store(&mut self) -> TransportResult<()> {
        if !self.credentials.has_changed().unwrap_or(false) {
            return Ok(());
        }
        let Some(credential) = self.credentials.borrow_and_update().clone() else {
            return Ok(());
        };

        match self.transport.authenticate_channel(&credential).await {
            Ok(()) => {
                info!("channel authenticated");
                Ok(())
            }
            Err(error) => {
                warn!(%error, "channel authentication failed; discarding credential");
                self.tokens.clear();
                let _ = self.credentials.borrow_and_update();
                self.transport.forget_credential();
                self.passcode.reset();
                Err(error)
            }
        }
    }

    /// Make `conversation_id` the active conversation, leaving the previous one.
    pub fn enter_conversation(&mut self, conversation_id: impl Into<ConversationId>) {
        let conversation_id = conversation_id.into();
        if let Some(previous) = self.active.take() {
            if previous != conversation_id {
                self.engine.leave(&previous);
            }
        }

        info!(conversation = %conversation_id, "entering conversation");
        self.engine.enter(conversation_id.clone());
        self.active = Some(conversation_id);
    }

    pub fn leave_conversation(&mut self) {
        if let Some(conversation_id) = self.active.take() {
            self.engine.leave(&conversation_id);
        }
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn default_conversation(&self) -> Option<&ConversationId> {
        self.default_conversation.as_ref()
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }

    /// Messages of the active conversation in arrival order.
    pub fn ordered_messages(&self) -> &[Message] {
        match &self.active {
            Some(conversation_id) => self.engine.messages(conversation_id),
            None => &[],
        }
    }

    pub fn conversation_phase(&self) -> SyncPhase {
        match &self.active {
            Some(conversation_id) => self.engine.phase(conversation_id),
            None => SyncPhase::Idle,
        }
    }

    pub fn pump(&mut self) -> Vec<SyncUpdate> {
        self.engine.pump()
    }

    pub async fn next_event(&mut self) -> Option<SyncUpdate> {
        self.engine.next_event().await
    }

    /// Wait until the active conversation has finished loading or refreshing.
    pub async fn settle(&mut self) -> SyncPhase {
        match self.active.clone() {
            Some(conversation_id) => self.engine.settle(&conversation_id).await,
            None => SyncPhase::Idle,
        }
    }

    pub fn refresh_conversation(&mut self) -> bool {
        match &self.active {
            Some(conversation_id) => self.engine.refresh(conversation_id).is_some(),
            None => false,
        }
    }

    /// Send `text` to the active conversation. Blank input is not sent and
    /// yields `Ok(None)`. An accepted message is picked up by a refetch.
    pub async fn send_message(&mut self, text: &str) -> ClientResult<Option<SendAck>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let conversation_id = self.active.clone().ok_or(ClientError::NoConversation)?;

        let ack = self.transport.send(&conversation_id, text).await?;
        info!(conversation = %conversation_id, message = %ack.message_id, "message accepted");
        self.engine.refresh(&conversation_id);
        Ok(Some(ack))
    }

    pub async fn list_chats(&self) -> ClientResult<Vec<Chat>> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        Ok(self.transport.list_chats().await?)
    }

    /// Leave the active conversation and drop the credential.
    pub fn logout(&mut self) {
        self.leave_conversation();
        self.tokens.clear();
        self.transport.forget_credential();
        self.passcode.reset();
        info!("logged out");
    }
}
