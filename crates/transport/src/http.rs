//! Request/response client for the chat server's REST endpoints.

use std::sync::{Arc, PoisonError, RwLock};

use parley_config::ApiConfig;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use crate::entities::{Chat, ConversationId, Credential, Message};
use crate::error::{TransportError, TransportResult};

#[derive(Serialize)]
struct CodeRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct CodeValidation<'a> {
    email: &'a str,
    otp: &'a str,
}

#[derive(Serialize)]
struct NewMessage<'a> {
    text: &'a str,
}

#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    bearer: Arc<RwLock<Option<String>>>,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> TransportResult<Self> {
        let client = Client::builder()
            .user_agent("parley-client")
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| TransportError::network(format!("failed to build http client: {err}")))?;

        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attach (or with `None`, drop) the access token sent with every request.
    pub fn set_bearer(&self, token: Option<String>) {
        *self.bearer.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn has_bearer(&self) -> bool {
        self.bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self
            .bearer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
        {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `POST /tokens {email}`: ask the server to email a one-time code.
    pub async fn request_code(&self, email: &str) -> TransportResult<()> {
        debug!(email, "requesting one-time code");

        let response = self
            .client
            .post(self.url("/tokens"))
            .json(&CodeRequest { email })
            .send()
            .await?;

        check(response, "token endpoint").await?;
        Ok(())
    }

    /// `POST /tokens {email, otp}`: exchange the code for a credential.
    pub async fn validate_code(&self, email: &str, code: &str) -> TransportResult<Credential> {
        debug!(email, "validating one-time code");

        let response = self
            .client
            .post(self.url("/tokens"))
            .json(&CodeValidation { email, otp: code })
            .send()
            .await?;

        let response = match check(response, "token endpoint").await {
            Ok(response) => response,
            Err(TransportError::ServerRejected { status, .. }) if (400..500).contains(&status) => {
                return Err(TransportError::InvalidCode)
            }
            Err(TransportError::NotFound(_)) => return Err(TransportError::InvalidCode),
            Err(err) => return Err(err),
        };

        Ok(response.json::<Credential>().await?)
    }

    /// `GET /chats`
    pub async fn list_chats(&self) -> TransportResult<Vec<Chat>> {
        let response = self
            .authorized(self.client.get(self.url("/chats")))
            .send()
            .await?;

        Ok(check(response, "chat list").await?.json().await?)
    }

    /// `GET /chats/:id/messages`, oldest first.
    pub async fn fetch_history(&self, conversation_id: &ConversationId) -> TransportResult<Vec<Message>> {
        let response = self
            .authorized(
                self.client
                    .get(self.url(&format!("/chats/{conversation_id}/messages"))),
            )
            .send()
            .await?;

        let messages: Vec<Message> = check(response, &format!("chat {conversation_id}"))
            .await?
            .json()
            .await?;
        debug!(conversation = %conversation_id, count = messages.len(), "fetched history");
        Ok(messages)
    }

    /// `POST /chats/:id/messages {text}`, returning the created message.
    pub async fn create_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> TransportResult<Message> {
        let response = self
            .authorized(
                self.client
                    .post(self.url(&format!("/chats/{conversation_id}/messages"))),
            )
            .json(&NewMessage { text })
            .send()
            .await?;

        Ok(check(response, &format!("chat {conversation_id}"))
            .await?
            .json()
            .await?)
    }
}

impl std::fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApi")
            .field("base_url", &self.base_url)
            .field("authorized", &self.has_bearer())
            .finish()
    }
}

async fn check(response: Response, what: &str) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(TransportError::not_found(what));
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), what, "server rejected request");
    Err(TransportError::rejected(status.as_u16(), body))
}
