use std::sync::{Arc, Mutex};

use parley_auth::PasscodeStep;
use parley_chats::SyncPhase;
use parley_config::ClientConfig;
use parley_runtime::{ChatClient, ClientError};
use parley_transport::{Chat, ConversationId, Credential, MemoryTransport, Message, TransportError};

fn client() -> (Arc<MemoryTransport>, ChatClient<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let client = ChatClient::new(Arc::clone(&transport), &ClientConfig::default());
    (transport, client)
}

async fn enter_code(client: &mut ChatClient<MemoryTransport>, code: &str) -> Option<Credential> {
    let mut issued = None;
    for (index, digit) in code.chars().enumerate() {
        if let Some(credential) = client.submit_digit(index, &digit.to_string()).await {
            issued = Some(credential);
        }
    }
    issued
}

#[tokio::test]
async fn login_stores_token_and_authenticates_channel() {
    let (transport, mut client) = client();
    transport.script_validation(Ok(Credential::new("tok1")));

    let issued = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&issued);
    client.on_credential_issued(move |credential| {
        sink.lock().unwrap().push(credential.access.clone());
    });

    client.submit_email("a@b.com").await;
    let credential = enter_code(&mut client, "123456").await;

    assert_eq!(credential.map(|c| c.access), Some("tok1".to_string()));
    assert_eq!(client.tokens().get().map(|c| c.access), Some("tok1".to_string()));
    assert_eq!(transport.authenticated_tokens(), vec!["tok1"]);
    assert_eq!(transport.calls().validate_code, 1);
    assert_eq!(*issued.lock().unwrap(), vec!["tok1"]);
    assert_eq!(client.passcode().step(), PasscodeStep::Authenticated);
}

#[tokio::test]
async fn channel_rejection_discards_the_credential() {
    let (transport, mut client) = client();
    transport.script_authentication(Err(TransportError::rejected(401, "bad token")));

    client.submit_email("a@b.com").await;
    let credential = enter_code(&mut client, "123456").await;

    assert!(credential.is_none());
    assert!(!client.is_authenticated());
    assert!(transport.credential_forgotten());
}

#[tokio::test]
async fn login_can_be_retried_after_channel_rejection() {
    let (transport, mut client) = client();
    transport.script_authentication(Err(TransportError::rejected(401, "bad token")));
    transport.script_validation(Ok(Credential::new("tok1")));
    transport.script_validation(Ok(Credential::new("tok2")));

    client.submit_email("a@b.com").await;
    assert!(enter_code(&mut client, "123456").await.is_none());
    assert_eq!(client.passcode().step(), PasscodeStep::CollectEmail);

    client.submit_email("a@b.com").await;
    assert_eq!(transport.calls().request_code, 2);
    assert_eq!(client.passcode().step(), PasscodeStep::CollectCode);

    let credential = enter_code(&mut client, "654321").await.expect("second login succeeds");
    assert_eq!(credential.access, "tok2");
    assert!(client.is_authenticated());
    assert_eq!(transport.authenticated_tokens(), vec!["tok1", "tok2"]);
}

#[tokio::test]
async fn credential_restored_after_logout_reauthenticates_channel() {
    let (transport, mut client) = client();
    client.restore_credential(Credential::new("first")).await.unwrap();
    client.logout();

    client.restore_credential(Credential::new("second")).await.unwrap();

    assert!(client.is_authenticated());
    assert_eq!(transport.authenticated_tokens(), vec!["first", "second"]);
}

#[tokio::test]
async fn restored_credential_authenticates_channel() {
    let (transport, mut client) = client();

    client
        .restore_credential(Credential::new("saved"))
        .await
        .expect("channel accepts the token");

    assert!(client.is_authenticated());
    assert_eq!(transport.authenticated_tokens(), vec!["saved"]);
}

#[tokio::test]
async fn conversation_thread_merges_history_and_pushes() {
    let (transport, mut client) = client();
    transport.set_history("1", vec![Message::new("m1", "1", "hi")]);

    let conversation = client.default_conversation().cloned().expect("default configured");
    client.enter_conversation(conversation);
    assert_eq!(client.settle().await, SyncPhase::Ready);

    transport.push(Message::new("m1", "1", "hi"));
    transport.push(Message::new("m2", "1", "there"));
    client.pump();

    let texts: Vec<&str> = client.ordered_messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["hi", "there"]);
}

#[tokio::test]
async fn switching_conversations_leaves_the_previous_one() {
    let (transport, mut client) = client();

    client.enter_conversation("1");
    client.settle().await;
    client.enter_conversation("2");
    client.settle().await;

    assert_eq!(transport.subscriber_count(), 1);
    assert_eq!(client.active_conversation().map(|id| id.as_str()), Some("2"));

    transport.push(Message::new("m1", "1", "stale"));
    client.pump();
    assert!(client.ordered_messages().is_empty());

    client.leave_conversation();
    assert_eq!(transport.subscriber_count(), 0);
    assert_eq!(client.conversation_phase(), SyncPhase::Idle);
}

#[tokio::test]
async fn sent_message_appears_after_refresh() {
    let (transport, mut client) = client();
    client.enter_conversation("1");
    client.settle().await;

    let ack = client
        .send_message("  hello  ")
        .await
        .expect("send succeeds")
        .expect("non-blank text is sent");

    assert_eq!(transport.sent_messages(), vec![(ConversationId::from("1"), "hello".to_string())]);
    assert_eq!(client.conversation_phase(), SyncPhase::Refreshing);
    client.settle().await;

    let ids: Vec<_> = client.ordered_messages().iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, vec![ack.message_id]);
}

#[tokio::test]
async fn blank_messages_are_not_sent() {
    let (transport, mut client) = client();
    client.enter_conversation("1");

    assert!(client.send_message("   ").await.unwrap().is_none());
    assert_eq!(transport.calls().send, 0);
}

#[tokio::test]
async fn send_failures_are_returned_to_the_caller() {
    let (transport, mut client) = client();
    transport.fail_sends(Some(TransportError::network("offline")));

    assert!(matches!(
        client.send_message("hi").await,
        Err(ClientError::NoConversation)
    ));

    client.enter_conversation("1");
    client.settle().await;
    assert!(matches!(
        client.send_message("hi").await,
        Err(ClientError::Transport(TransportError::Network(_)))
    ));
    assert_eq!(client.conversation_phase(), SyncPhase::Ready);
}

#[tokio::test]
async fn listing_chats_requires_a_credential() {
    let (transport, mut client) = client();
    transport.set_chats(vec![Chat {
        id: "1".into(),
        title: "general".to_string(),
    }]);

    assert!(matches!(
        client.list_chats().await,
        Err(ClientError::NotAuthenticated)
    ));

    client.restore_credential(Credential::new("saved")).await.unwrap();
    let chats = client.list_chats().await.unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].title, "general");
}

#[tokio::test]
async fn logout_clears_credential_and_conversation() {
    let (transport, mut client) = client();
    client.restore_credential(Credential::new("saved")).await.unwrap();
    client.enter_conversation("1");

    client.logout();

    assert!(!client.is_authenticated());
    assert!(transport.credential_forgotten());
    assert_eq!(transport.subscriber_count(), 0);
    assert!(client.active_conversation().is_none());
    assert_eq!(client.passcode().step(), PasscodeStep::CollectEmail);
}
