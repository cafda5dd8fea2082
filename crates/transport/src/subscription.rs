//! Handle-based registration of push-message callbacks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::entities::Message;

/// Callback invoked once per inbound message.
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Returned by `subscribe`; passed back to `unsubscribe` to remove the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Subscribers keyed by handle, dispatched in registration order.
///
/// `dispatch` is called from a single reader, so a callback is never invoked
/// concurrently with itself.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<BTreeMap<u64, MessageCallback>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, on_message: MessageCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, on_message);
        SubscriptionHandle(id)
    }

    /// Returns `false` when the handle was already released.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0)
            .is_some()
    }

    /// Deliver a message to every current subscriber, returning how many were called.
    pub fn dispatch(&self, message: &Message) -> usize {
        // Callbacks run outside the lock so they may unsubscribe themselves.
        let callbacks: Vec<MessageCallback> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for callback in &callbacks {
            callback(message);
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}
