//! In-memory transport for exercising the state machines without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::entities::{Chat, ConversationId, Credential, Message, SendAck};
use crate::error::{TransportError, TransportResult};
use crate::subscription::{MessageCallback, SubscriberRegistry, SubscriptionHandle};
use crate::Transport;

/// Number of times each operation was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub request_code: usize,
    pub validate_code: usize,
    pub authenticate_channel: usize,
    pub list_chats: usize,
    pub fetch_history: usize,
    pub send: usize,
}

#[derive(Default)]
struct MemoryState {
    request_code_results: VecDeque<TransportResult<()>>,
    validate_results: VecDeque<TransportResult<Credential>>,
    authenticate_results: VecDeque<TransportResult<()>>,
    histories: HashMap<ConversationId, TransportResult<Vec<Message>>>,
    history_gates: HashMap<ConversationId, Arc<Semaphore>>,
    chats: Vec<Chat>,
    send_failure: Option<TransportError>,
    emails: Vec<String>,
    codes: Vec<String>,
    authenticated: Vec<String>,
    sent: Vec<(ConversationId, String)>,
    calls: CallCounts,
    next_message: u64,
    credential_forgotten: bool,
}

/// Scripted transport. Unscripted calls succeed; unknown conversations fetch
/// as empty histories.
#[derive(Default)]
pub struct MemoryTransport {
    subscribers: SubscriberRegistry,
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn script_request_code(&self, result: TransportResult<()>) {
        self.state().request_code_results.push_back(result);
    }

    pub fn script_validation(&self, result: TransportResult<Credential>) {
        self.state().validate_results.push_back(result);
    }

    pub fn script_authentication(&self, result: TransportResult<()>) {
        self.state().authenticate_results.push_back(result);
    }

    pub fn set_history(&self, conversation_id: impl Into<ConversationId>, messages: Vec<Message>) {
        self.state()
            .histories
            .insert(conversation_id.into(), Ok(messages));
    }

    pub fn fail_history(&self, conversation_id: impl Into<ConversationId>, error: TransportError) {
        self.state()
            .histories
            .insert(conversation_id.into(), Err(error));
    }

    pub fn set_chats(&self, chats: Vec<Chat>) {
        self.state().chats = chats;
    }

    pub fn fail_sends(&self, error: Option<TransportError>) {
        self.state().send_failure = error;
    }

    /// Make subsequent history fetches for the conversation wait until released.
    pub fn hold_history(&self, conversation_id: impl Into<ConversationId>) {
        self.state()
            .history_gates
            .insert(conversation_id.into(), Arc::new(Semaphore::new(0)));
    }

    /// Let one held fetch for the conversation complete.
    pub fn release_history(&self, conversation_id: impl Into<ConversationId>) {
        let conversation_id: ConversationId = conversation_id.into();
        if let Some(gate) = self.state().history_gates.get(&conversation_id) {
            gate.add_permits(1);
        }
    }

    /// Deliver a push event to current subscribers, as the channel reader would.
    pub fn push(&self, message: Message) -> usize {
        self.subscribers.dispatch(&message)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn requested_emails(&self) -> Vec<String> {
        self.state().emails.clone()
    }

    pub fn submitted_codes(&self) -> Vec<String> {
        self.state().codes.clone()
    }

    pub fn authenticated_tokens(&self) -> Vec<String> {
        self.state().authenticated.clone()
    }

    pub fn sent_messages(&self) -> Vec<(ConversationId, String)> {
        self.state().sent.clone()
    }

    pub fn credential_forgotten(&self) -> bool {
        self.state().credential_forgotten
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn request_code(&self, email: &str) -> TransportResult<()> {
        let mut state = self.state();
        state.calls.request_code += 1;
        state.emails.push(email.to_owned());
        state.request_code_results.pop_front().unwrap_or(Ok(()))
    }

    async fn validate_code(&self, email: &str, code: &str) -> TransportResult<Credential> {
        let mut state = self.state();
        state.calls.validate_code += 1;
        state.codes.push(code.to_owned());
        state
            .validate_results
            .pop_front()
            .unwrap_or_else(|| Ok(Credential::new(format!("token-for-{email}"))))
    }

    async fn authenticate_channel(&self, credential: &Credential) -> TransportResult<()> {
        let mut state = self.state();
        state.calls.authenticate_channel += 1;
        state.authenticated.push(credential.access.clone());
        state.credential_forgotten = false;
        state.authenticate_results.pop_front().unwrap_or(Ok(()))
    }

    fn forget_credential(&self) {
        self.state().credential_forgotten = true;
    }

    fn subscribe(&self, on_message: MessageCallback) -> SubscriptionHandle {
        self.subscribers.subscribe(on_message)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers.unsubscribe(handle)
    }

    async fn list_chats(&self) -> TransportResult<Vec<Chat>> {
        let mut state = self.state();
        state.calls.list_chats += 1;
        Ok(state.chats.clone())
    }

    async fn fetch_history(&self, conversation_id: &ConversationId) -> TransportResult<Vec<Message>> {
        let gate = {
            let mut state = self.state();
            state.calls.fetch_history += 1;
            state.history_gates.get(conversation_id).cloned()
        };

        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| TransportError::network("history gate closed"))?;
            permit.forget();
        }

        self.state()
            .histories
            .get(conversation_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send(&self, conversation_id: &ConversationId, text: &str) -> TransportResult<SendAck> {
        let mut state = self.state();
        state.calls.send += 1;
        if let Some(error) = state.send_failure.clone() {
            return Err(error);
        }

        state.next_message += 1;
        let message = Message::new(
            format!("srv-{}", state.next_message),
            conversation_id.clone(),
            text,
        );
        state.sent.push((conversation_id.clone(), text.to_owned()));

        let history = state
            .histories
            .entry(conversation_id.clone())
            .or_insert_with(|| Ok(Vec::new()));
        if let Ok(messages) = history {
            messages.push(message.clone());
        }

        Ok(SendAck::from(message))
    }
}
