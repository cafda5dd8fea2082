//! Reconciliation of fetched history with live push events.
//!
//! The synchronizer keeps one ordered, deduplicated message sequence per
//! entered conversation. Order is first-seen arrival order, not server
//! timestamp order.
//!
//! Every fetch is tagged with a [`FetchTicket`] carrying the epoch it was issued
//! under. Entering, re-entering or refreshing a conversation moves it to a new
//! epoch, and leaving drops it entirely, so a completion that arrives for an
//! older epoch is reported as [`HistoryOutcome::Stale`] and changes nothing.

use std::collections::{HashMap, HashSet};

use parley_transport::{
    ConversationId, Message, MessageId, SubscriptionHandle, TransportError, TransportResult,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not entered.
    Idle,
    /// Initial history fetch in flight; pushes are buffered.
    Loading,
    Ready,
    /// Ready, with a history refetch in flight.
    Refreshing,
    /// Terminal until the conversation is entered again.
    Error(TransportError),
}

impl SyncPhase {
    pub fn is_settled(&self) -> bool {
        !matches!(self, SyncPhase::Loading | SyncPhase::Refreshing)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncPhase::Error(TransportError::NotFound(_)))
    }
}

/// Identifies one history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    conversation_id: ConversationId,
    epoch: u64,
}

impl FetchTicket {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// History merged; `appended` counts messages that were not already present.
    Applied { appended: usize },
    Failed,
    /// The ticket no longer matches the conversation's current epoch.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Appended,
    /// Held until the initial history arrives.
    Buffered,
    Duplicate,
    /// Conversation not entered, or in the error state.
    Ignored,
}

#[derive(Debug)]
struct ConversationState {
    epoch: u64,
    phase: SyncPhase,
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
    buffered: Vec<Message>,
    subscription: Option<SubscriptionHandle>,
}

impl ConversationState {
    fn loading(epoch: u64, subscription: Option<SubscriptionHandle>) -> Self {
        Self {
            epoch,
            phase: SyncPhase::Loading,
            messages: Vec::new(),
            seen: HashSet::new(),
            buffered: Vec::new(),
            subscription,
        }
    }

    fn append_unique(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

#[derive(Debug, Default)]
pub struct MessageSynchronizer {
    conversations: HashMap<ConversationId, ConversationState>,
    last_epoch: u64,
}

impl MessageSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_epoch(&mut self) -> u64 {
        self.last_epoch += 1;
        self.last_epoch
    }

    /// Start (or restart) a conversation: prior messages are discarded and the
    /// returned ticket identifies the fetch that will seed it. An existing
    /// subscription is carried over.
    pub fn enter(&mut self, conversation_id: ConversationId) -> FetchTicket {
        let epoch = self.next_epoch();
        let subscription = self
            .conversations
            .remove(&conversation_id)
            .and_then(|previous| previous.subscription);

        debug!(conversation = %conversation_id, epoch, "entering conversation");
        self.conversations.insert(
            conversation_id.clone(),
            ConversationState::loading(epoch, subscription),
        );

        FetchTicket {
            conversation_id,
            epoch,
        }
    }

    /// Record the push subscription serving a conversation. Returns a handle the
    /// caller must release: the one replaced, or `handle` itself when the
    /// conversation is not entered.
    pub fn attach_subscription(
        &mut self,
        conversation_id: &ConversationId,
        handle: SubscriptionHandle,
    ) -> Option<SubscriptionHandle> {
        match self.conversations.get_mut(conversation_id) {
            Some(state) => state.subscription.replace(handle),
            None => Some(handle),
        }
    }

    pub fn subscription(&self, conversation_id: &ConversationId) -> Option<SubscriptionHandle> {
        self.conversations
            .get(conversation_id)
            .and_then(|state| state.subscription)
    }

    /// Begin a refetch of a ready conversation. A refresh issued while another is
    /// in flight supersedes it.
    pub fn begin_refresh(&mut self, conversation_id: &ConversationId) -> Option<FetchTicket> {
        let epoch = self.last_epoch + 1;
        let state = self.conversations.get_mut(conversation_id)?;
        if !matches!(state.phase, SyncPhase::Ready | SyncPhase::Refreshing) {
            return None;
        }

        self.last_epoch = epoch;
        state.epoch = epoch;
        state.phase = SyncPhase::Refreshing;
        Some(FetchTicket {
            conversation_id: conversation_id.clone(),
            epoch,
        })
    }

    pub fn apply_history(
        &mut self,
        ticket: &FetchTicket,
        result: TransportResult<Vec<Message>>,
    ) -> HistoryOutcome {
        let Some(state) = self.conversations.get_mut(&ticket.conversation_id) else {
            debug!(conversation = %ticket.conversation_id, "history for a conversation that was left");
            return HistoryOutcome::Stale;
        };

        if state.epoch != ticket.epoch {
            debug!(
                conversation = %ticket.conversation_id,
                ticket = ticket.epoch,
                current = state.epoch,
                "discarding stale history"
            );
            return HistoryOutcome::Stale;
        }

        let history = match result {
            Ok(history) => history,
            Err(error) => {
                warn!(conversation = %ticket.conversation_id, %error, "history fetch failed");
                state.buffered.clear();
                state.phase = SyncPhase::Error(error);
                return HistoryOutcome::Failed;
            }
        };

        let appended = match state.phase {
            SyncPhase::Loading => {
                let buffered = std::mem::take(&mut state.buffered);
                history
                    .into_iter()
                    .chain(buffered)
                    .filter(|message| state.append_unique(message.clone()))
                    .count()
            }
            SyncPhase::Refreshing => history
                .into_iter()
                .filter(|message| state.append_unique(message.clone()))
                .count(),
            _ => return HistoryOutcome::Stale,
        };

        state.phase = SyncPhase::Ready;
        debug!(
            conversation = %ticket.conversation_id,
            appended,
            total = state.messages.len(),
            "history applied"
        );
        HistoryOutcome::Applied { appended }
    }

    /// Merge one pushed message into the conversation it names.
    pub fn apply_push(&mut self, message: Message) -> PushOutcome {
        let Some(state) = self.conversations.get_mut(&message.chat_id) else {
            return PushOutcome::Ignored;
        };

        match state.phase {
            SyncPhase::Loading => {
                if state.buffered.iter().any(|pending| pending.id == message.id) {
                    PushOutcome::Duplicate
                } else {
                    state.buffered.push(message);
                    PushOutcome::Buffered
                }
            }
            SyncPhase::Ready | SyncPhase::Refreshing => {
                if state.append_unique(message) {
                    PushOutcome::Appended
                } else {
                    PushOutcome::Duplicate
                }
            }
            SyncPhase::Idle | SyncPhase::Error(_) => PushOutcome::Ignored,
        }
    }

    /// Drop a conversation's state, returning its subscription for release.
    pub fn leave(&mut self, conversation_id: &ConversationId) -> Option<SubscriptionHandle> {
        let state = self.conversations.remove(conversation_id)?;
        debug!(conversation = %conversation_id, "left conversation");
        state.subscription
    }

    pub fn messages(&self, conversation_id: &ConversationId) -> &[Message] {
        self.conversations
            .get(conversation_id)
            .map(|state| state.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn phase(&self, conversation_id: &ConversationId) -> SyncPhase {
        self.conversations
            .get(conversation_id)
            .map(|state| state.phase.clone())
            .unwrap_or(SyncPhase::Idle)
    }

    pub fn is_entered(&self, conversation_id: &ConversationId) -> bool {
        self.conversations.contains_key(conversation_id)
    }

    pub fn entered(&self) -> impl Iterator<Item = &ConversationId> {
        self.conversations.keys()
    }
}
