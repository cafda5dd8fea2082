//! # Parley Chats Crate
//!
//! Keeps the message thread of each entered conversation consistent while
//! fetched history and live push events race each other.
//!
//! ## Architecture
//!
//! - **sync**: [`MessageSynchronizer`], the pure per-conversation state machine
//! - **engine**: [`SyncEngine`], which subscribes, fetches and feeds the
//!   synchronizer on the owner's task
//!
//! ## Usage
//!
//! ```rust,ignore
//! use parley_chats::SyncEngine;
//!
//! let mut engine = SyncEngine::new(transport);
//! engine.enter("1");
//! engine.settle(&"1".into()).await;
//! for message in engine.messages(&"1".into()) {
//!     println!("{}", message.text);
//! }
//! ```

pub mod engine;
pub mod sync;

pub use engine::{SyncEngine, SyncEvent, SyncUpdate};
pub use sync::{FetchTicket, HistoryOutcome, MessageSynchronizer, PushOutcome, SyncPhase};
