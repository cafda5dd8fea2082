//! Integration tests for the chats crate.

use std::sync::Arc;

use parley_chats::{HistoryOutcome, PushOutcome, SyncEngine, SyncPhase, SyncUpdate};
use parley_transport::{ConversationId, Message, MemoryTransport, TransportError};

fn msg(id: &str, chat: &str) -> Message {
    Message::new(id, chat, format!("text of {id}"))
}

fn ids(engine: &SyncEngine<MemoryTransport>, chat: &str) -> Vec<String> {
    engine
        .messages(&chat.into())
        .iter()
        .map(|message| message.id.to_string())
        .collect()
}

fn setup() -> (Arc<MemoryTransport>, SyncEngine<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let engine = SyncEngine::new(Arc::clone(&transport));
    (transport, engine)
}

#[tokio::test]
async fn history_and_matching_push_yield_one_message() {
    let (transport, mut engine) = setup();
    let c1: ConversationId = "c1".into();
    transport.set_history("c1", vec![msg("m1", "c1")]);

    engine.enter("c1");
    assert_eq!(engine.settle(&c1).await, SyncPhase::Ready);

    assert_eq!(transport.push(msg("m1", "c1")), 1);
    let updates = engine.pump();

    assert_eq!(
        updates,
        vec![SyncUpdate::Push {
            conversation_id: c1.clone(),
            outcome: PushOutcome::Duplicate,
        }]
    );
    assert_eq!(engine.messages(&c1).len(), 1);
}

#[tokio::test]
async fn push_while_loading_is_merged_after_history() {
    let (transport, mut engine) = setup();
    let c1: ConversationId = "c1".into();
    transport.set_history("c1", vec![msg("m1", "c1"), msg("m2", "c1")]);
    transport.hold_history("c1");

    engine.enter("c1");
    transport.push(msg("m2", "c1"));
    transport.push(msg("m3", "c1"));
    engine.pump();
    assert_eq!(engine.phase(&c1), SyncPhase::Loading);
    assert!(engine.messages(&c1).is_empty());

    transport.release_history("c1");
    engine.settle(&c1).await;

    assert_eq!(ids(&engine, "c1"), vec!["m1", "m2", "m3"]);
}

#[tokio::test]
async fn pushes_for_other_conversations_never_reach_the_engine() {
    let (transport, mut engine) = setup();
    let c1: ConversationId = "c1".into();
    engine.enter("c1");
    engine.settle(&c1).await;

    transport.push(msg("x1", "c2"));

    assert!(engine.pump().is_empty());
    assert!(engine.messages(&c1).is_empty());
}

#[tokio::test]
async fn leaving_unsubscribes_and_discards_late_history() {
    let (transport, mut engine) = setup();
    let c1: ConversationId = "c1".into();
    transport.set_history("c1", vec![msg("m1", "c1")]);
    transport.hold_history("c1");

    engine.enter("c1");
    assert_eq!(transport.subscriber_count(), 1);

    engine.leave(&c1);
    assert_eq!(transport.subscriber_count(), 0);

    transport.release_history("c1");
    let update = engine.next_event().await.expect("fetch completes");

    assert_eq!(
        update,
        SyncUpdate::History {
            conversation_id: c1.clone(),
            outcome: HistoryOutcome::Stale,
        }
    );
    assert_eq!(engine.phase(&c1), SyncPhase::Idle);
    assert!(engine.messages(&c1).is_empty());
}

#[tokio::test]
async fn fetch_from_previous_entry_cannot_overwrite_reentry() {
    let (transport, mut engine) = setup();
    let c1: ConversationId = "c1".into();
    transport.set_history("c1", vec![msg("old", "c1")]);
    transport.hold_history("c1");

    let first = engine.enter("c1");
    engine.leave(&c1);
    let second = engine.enter("c1");
    assert_ne!(first.epoch(), second.epoch());

    transport.set_history("c1", vec![msg("new", "c1")]);
    transport.release_history("c1");
    transport.release_history("c1");

    let mut outcomes = Vec::new();
    while outcomes.len() < 2 {
        if let Some(SyncUpdate::History { outcome, .. }) = engine.next_event().await {
            outcomes.push(outcome);
        }
    }

    assert!(outcomes.contains(&HistoryOutcome::Stale));
    assert_eq!(engine.phase(&c1), SyncPhase::Ready);
    assert_eq!(ids(&engine, "c1"), vec!["new"]);
}

#[tokio::test]
async fn reentry_matches_a_fresh_fetch() {
    let (transport, mut engine) = setup();
    let c1: ConversationId = "c1".into();
    transport.set_history("c1", vec![msg("m1", "c1")]);

    engine.enter("c1");
    engine.settle(&c1).await;
    transport.push(msg("p1", "c1"));
    engine.pump();
    assert_eq!(ids(&engine, "c1"), vec!["m1", "p1"]);

    engine.leave(&c1);
    let fresh = vec![msg("m1", "c1"), msg("m2", "c1")];
    transport.set_history("c1", fresh.clone());
    engine.enter("c1");
    engine.settle(&c1).await;

    assert_eq!(engine.messages(&c1), fresh.as_slice());
    assert_eq!(transport.subscriber_count(), 1);
}

#[tokio::test]
async fn entering_twice_keeps_a_single_subscription() {
    let (transport, mut engine) = setup();
    let c1: ConversationId = "c1".into();

    engine.enter("c1");
    engine.enter("c1");
    engine.settle(&c1).await;
    // The superseded fetch may still be queued.
    engine.pump();

    assert_eq!(transport.subscriber_count(), 1);
    assert_eq!(transport.calls().fetch_history, 2);
    assert_eq!(transport.push(msg("m1", "c1")), 1);
    engine.pump();
    assert_eq!(ids(&engine, "c1"), vec!["m1"]);
}

#[tokio::test]
async fn refresh_picks_up_messages_without_push() {
    let (transport, mut engine) = setup();
    let c1: ConversationId = "c1".into();
    transport.set_history("c1", vec![msg("m1", "c1")]);
    engine.enter("c1");
    engine.settle(&c1).await;

    transport.set_history("c1", vec![msg("m1", "c1"), msg("m2", "c1")]);
    assert!(engine.refresh(&c1).is_some());
    assert_eq!(engine.phase(&c1), SyncPhase::Refreshing);

    assert_eq!(engine.settle(&c1).await, SyncPhase::Ready);
    assert_eq!(ids(&engine, "c1"), vec!["m1", "m2"]);
}

#[tokio::test]
async fn missing_conversation_settles_as_not_found() {
    let (transport, mut engine) = setup();
    let gone: ConversationId = "404".into();
    transport.fail_history("404", TransportError::not_found("chat 404"));

    engine.enter("404");
    let phase = engine.settle(&gone).await;

    assert!(phase.is_not_found());
    assert!(engine.refresh(&gone).is_none());
}
