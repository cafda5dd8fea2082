use std::sync::Arc;

use parley_transport::Credential;
use tokio::sync::watch;
use tracing::debug;

/// Holds the current access credential for the lifetime of the process.
///
/// Clones share the same slot. Observers use [`TokenStore::watch`] to react
/// when a credential is set or cleared; the store itself never touches the
/// channel.
#[derive(Clone)]
pub struct TokenStore {
    slot: Arc<watch::Sender<Option<Credential>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        let (slot, _observer) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    pub fn set(&self, credential: Credential) {
        debug!("credential stored");
        self.slot.send_replace(Some(credential));
    }

    pub fn get(&self) -> Option<Credential> {
        self.slot.borrow().clone()
    }

    pub fn clear(&self) {
        if self.slot.send_replace(None).is_some() {
            debug!("credential cleared");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Credential>> {
        self.slot.subscribe()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
