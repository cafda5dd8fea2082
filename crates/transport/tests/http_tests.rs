//! HTTP adapter tests against a mock chat server.

use httpmock::prelude::*;
use parley_config::ApiConfig;
use parley_transport::{HttpApi, Message, TransportError};
use serde_json::json;

fn api_for(server: &MockServer) -> HttpApi {
    let config = ApiConfig {
        base_url: format!("{}/", server.base_url()),
        request_timeout_seconds: 2,
    };
    HttpApi::new(&config).expect("http client builds")
}

#[tokio::test]
async fn request_code_posts_email_to_tokens() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/tokens")
                .json_body(json!({ "email": "a@b.com" }));
            then.status(201);
        })
        .await;

    api_for(&server)
        .request_code("a@b.com")
        .await
        .expect("code request succeeds");

    mock.assert_async().await;
}

#[tokio::test]
async fn request_code_surfaces_server_rejection() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/tokens");
            then.status(429).body("rate limited");
        })
        .await;

    let err = api_for(&server)
        .request_code("a@b.com")
        .await
        .expect_err("rejection expected");

    assert_eq!(err, TransportError::rejected(429, "rate limited"));
}

#[tokio::test]
async fn validate_code_returns_credential() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/tokens")
                .json_body(json!({ "email": "a@b.com", "otp": "123456" }));
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({ "access": "tok1", "refresh": "ref1" }));
        })
        .await;

    let credential = api_for(&server)
        .validate_code("a@b.com", "123456")
        .await
        .expect("credential issued");

    mock.assert_async().await;
    assert_eq!(credential.access, "tok1");
    assert_eq!(credential.refresh.as_deref(), Some("ref1"));
}

#[tokio::test]
async fn validate_code_maps_client_errors_to_invalid_code() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/tokens");
            then.status(401).body("bad otp");
        })
        .await;

    let err = api_for(&server)
        .validate_code("a@b.com", "000000")
        .await
        .expect_err("invalid code expected");

    assert_eq!(err, TransportError::InvalidCode);
}

#[tokio::test]
async fn validate_code_keeps_server_faults_distinct() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/tokens");
            then.status(503);
        })
        .await;

    let err = api_for(&server)
        .validate_code("a@b.com", "123456")
        .await
        .expect_err("server fault expected");

    assert!(matches!(err, TransportError::ServerRejected { status: 503, .. }));
}

#[tokio::test]
async fn fetch_history_sends_bearer_and_decodes_messages() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/chats/c1/messages")
                .header("Authorization", "Bearer tok1");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!([
                    { "id": "m1", "text": "first", "chatId": "c1" },
                    { "id": 2, "text": "second", "chatId": "c1",
                      "author": { "id": 4, "email": "a@b.com" } }
                ]));
        })
        .await;

    let api = api_for(&server);
    api.set_bearer(Some("tok1".to_string()));

    let messages = api
        .fetch_history(&"c1".into())
        .await
        .expect("history decodes");

    mock.assert_async().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], Message::new("m1", "c1", "first"));
    assert_eq!(messages[1].id.as_str(), "2");
    assert_eq!(messages[1].author_email(), Some("a@b.com"));
}

#[tokio::test]
async fn fetch_history_reports_missing_conversation() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/chats/404/messages");
            then.status(404);
        })
        .await;

    let err = api_for(&server)
        .fetch_history(&"404".into())
        .await
        .expect_err("missing chat");

    assert!(matches!(err, TransportError::NotFound(_)));
}

#[tokio::test]
async fn fetch_history_flags_malformed_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/chats/c1/messages");
            then.status(200)
                .header("Content-Type", "application/json")
                .body(r#"{"not":"a list"}"#);
        })
        .await;

    let err = api_for(&server)
        .fetch_history(&"c1".into())
        .await
        .expect_err("decode failure");

    assert!(matches!(err, TransportError::Protocol(_)));
}

#[tokio::test]
async fn list_chats_accepts_numeric_ids() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/chats");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!([{ "id": 1, "title": "General" }, { "id": 2, "title": "Random" }]));
        })
        .await;

    let chats = api_for(&server).list_chats().await.expect("chat list");

    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].id.as_str(), "1");
    assert_eq!(chats[1].title, "Random");
}

#[tokio::test]
async fn create_message_posts_text_and_returns_created_message() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chats/c1/messages")
                .json_body(json!({ "text": "hello" }));
            then.status(201)
                .header("Content-Type", "application/json")
                .json_body(json!({ "id": "srv-1", "text": "hello", "chatId": "c1" }));
        })
        .await;

    let created = api_for(&server)
        .create_message(&"c1".into(), "hello")
        .await
        .expect("message created");

    mock.assert_async().await;
    assert_eq!(created.id.as_str(), "srv-1");
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let config = ApiConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        request_timeout_seconds: 1,
    };
    let api = HttpApi::new(&config).expect("http client builds");

    let err = api.list_chats().await.expect_err("connection refused");
    assert!(err.is_transient(), "expected network error, got {err:?}");
}
