use std::sync::Arc;

use parley_transport::{ConversationId, Message, Transport, TransportResult};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::sync::{FetchTicket, HistoryOutcome, MessageSynchronizer, PushOutcome, SyncPhase};

/// Input to the synchronizer, produced by fetch tasks and push callbacks.
#[derive(Debug)]
pub enum SyncEvent {
    History {
        ticket: FetchTicket,
        result: TransportResult<Vec<Message>>,
    },
    Push(Message),
}

/// What applying one [`SyncEvent`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    History {
        conversation_id: ConversationId,
        outcome: HistoryOutcome,
    },
    Push {
        conversation_id: ConversationId,
        outcome: PushOutcome,
    },
}

impl SyncUpdate {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            SyncUpdate::History {
                conversation_id, ..
            }
            | SyncUpdate::Push {
                conversation_id, ..
            } => conversation_id,
        }
    }

    /// Whether the conversation's visible sequence may have changed.
    pub fn changed_messages(&self) -> bool {
        match self {
            SyncUpdate::History { outcome, .. } => {
                matches!(outcome, HistoryOutcome::Applied { appended } if *appended > 0)
            }
            SyncUpdate::Push { outcome, .. } => *outcome == PushOutcome::Appended,
        }
    }
}

/// Runs a [`MessageSynchronizer`] against a transport.
///
/// History fetches run on spawned tasks and push callbacks fire on the channel
/// reader; both only enqueue events. The synchronizer is mutated solely by
/// [`SyncEngine::pump`] and [`SyncEngine::next_event`] on the owner's task.
pub struct SyncEngine<T: ?Sized> {
    transport: Arc<T>,
    sync: MessageSynchronizer,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl<T> SyncEngine<T>
where
    T: Transport + ?Sized + 'static,
{
    pub fn new(transport: Arc<T>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            sync: MessageSynchronizer::new(),
            events_tx,
            events_rx,
        }
    }

    /// Subscribe to pushes for the conversation and start its history fetch.
    /// Entering an already entered conversation restarts it from a fresh fetch.
    pub fn enter(&mut self, conversation_id: impl Into<ConversationId>) -> FetchTicket {
        let conversation_id = conversation_id.into();
        let ticket = self.sync.enter(conversation_id.clone());

        if self.sync.subscription(&conversation_id).is_none() {
            let events = self.events_tx.clone();
            let wanted = conversation_id.clone();
            let handle = self.transport.subscribe(Arc::new(move |message: &Message| {
                if message.chat_id == wanted {
                    let _ = events.send(SyncEvent::Push(message.clone()));
                }
            }));
            if let Some(released) = self.sync.attach_subscription(&conversation_id, handle) {
                self.transport.unsubscribe(released);
            }
        }

        self.spawn_fetch(ticket.clone());
        ticket
    }

    /// Unsubscribe and discard the conversation. A fetch still in flight for it
    /// completes as stale.
    pub fn leave(&mut self, conversation_id: &ConversationId) {
        if let Some(handle) = self.sync.leave(conversation_id) {
            if !self.transport.unsubscribe(handle) {
                warn!(conversation = %conversation_id, "subscription was already released");
            }
        }
    }

    /// Refetch a ready conversation; `None` when it is not ready.
    pub fn refresh(&mut self, conversation_id: &ConversationId) -> Option<FetchTicket> {
        let ticket = self.sync.begin_refresh(conversation_id)?;
        self.spawn_fetch(ticket.clone());
        Some(ticket)
    }

    fn spawn_fetch(&self, ticket: FetchTicket) {
        let transport = Arc::clone(&self.transport);
        let events = self.events_tx.clone();
        debug!(conversation = %ticket.conversation_id(), epoch = ticket.epoch(), "fetching history");
        tokio::spawn(async move {
            let result = transport.fetch_history(ticket.conversation_id()).await;
            let _ = events.send(SyncEvent::History { ticket, result });
        });
    }

    pub fn apply(&mut self, event: SyncEvent) -> SyncUpdate {
        match event {
            SyncEvent::History { ticket, result } => {
                let outcome = self.sync.apply_history(&ticket, result);
                SyncUpdate::History {
                    conversation_id: ticket.conversation_id().clone(),
                    outcome,
                }
            }
            SyncEvent::Push(message) => {
                let conversation_id = message.chat_id.clone();
                let outcome = self.sync.apply_push(message);
                SyncUpdate::Push {
                    conversation_id,
                    outcome,
                }
            }
        }
    }

    /// Apply every event that is already queued.
    pub fn pump(&mut self) -> Vec<SyncUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            updates.push(self.apply(event));
        }
        updates
    }

    /// Wait for the next event and apply it.
    pub async fn next_event(&mut self) -> Option<SyncUpdate> {
        let event = self.events_rx.recv().await?;
        Some(self.apply(event))
    }

    /// Apply events until the conversation is no longer loading or refreshing.
    pub async fn settle(&mut self, conversation_id: &ConversationId) -> SyncPhase {
        loop {
            let phase = self.sync.phase(conversation_id);
            if phase.is_settled() {
                return phase;
            }
            if self.next_event().await.is_none() {
                return self.sync.phase(conversation_id);
            }
        }
    }

    pub fn messages(&self, conversation_id: &ConversationId) -> &[Message] {
        self.sync.messages(conversation_id)
    }

    pub fn phase(&self, conversation_id: &ConversationId) -> SyncPhase {
        self.sync.phase(conversation_id)
    }

    pub fn synchronizer(&self) -> &MessageSynchronizer {
        &self.sync
    }
}
