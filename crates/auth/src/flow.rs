use std::sync::Arc;
use std::time::{Duration, Instant};

use parley_config::AuthConfig;
use parley_transport::{Credential, Transport};
use tracing::{debug, info, warn};

use crate::passcode::{PasscodeAction, PasscodeSession, PasscodeStep};
use crate::token::TokenStore;

pub type CredentialListener = Box<dyn Fn(&Credential) + Send + Sync>;

/// Drives a [`PasscodeSession`] against a transport.
///
/// Every public method runs the request the session asks for to completion
/// before returning, and returns the credential when that call finished the
/// login. On success the credential is written to the [`TokenStore`] and every
/// listener registered with [`PasscodeFlow::on_credential_issued`] is invoked.
pub struct PasscodeFlow<T: ?Sized> {
    transport: Arc<T>,
    tokens: TokenStore,
    session: PasscodeSession,
    listeners: Vec<CredentialListener>,
}

impl<T> PasscodeFlow<T>
where
    T: Transport + ?Sized,
{
    pub fn new(transport: Arc<T>, tokens: TokenStore) -> Self {
        Self {
            transport,
            tokens,
            session: PasscodeSession::new(),
            listeners: Vec::new(),
        }
    }

    pub fn with_error_flash(mut self, error_flash: Duration) -> Self {
        self.session = PasscodeSession::with_error_flash(error_flash);
        self
    }

    pub fn with_config(self, config: &AuthConfig) -> Self {
        self.with_error_flash(config.error_flash())
    }

    pub fn session(&self) -> &PasscodeSession {
        &self.session
    }

    pub fn step(&self) -> PasscodeStep {
        self.session.step()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn on_credential_issued<F>(&mut self, listener: F)
    where
        F: Fn(&Credential) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub async fn submit_email(&mut self, email: &str) -> Option<Credential> {
        let action = self.session.submit_email(email);
        self.run(action).await
    }

    pub async fn submit_digit(&mut self, index: usize, value: &str) -> Option<Credential> {
        let action = self.session.submit_digit(index, value);
        self.run(action).await
    }

    pub fn backspace(&mut self, index: usize) {
        self.session.backspace(index);
    }

    pub async fn submit_code(&mut self) -> Option<Credential> {
        let action = self.session.submit_code();
        self.run(action).await
    }

    pub async fn recheck(&mut self) -> Option<Credential> {
        let action = self.session.recheck();
        self.run(action).await
    }

    pub fn clear_expired_flash(&mut self) -> bool {
        self.session.clear_expired_flash(Instant::now())
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }

    async fn run(&mut self, action: Option<PasscodeAction>) -> Option<Credential> {
        match action? {
            PasscodeAction::RequestCode { email } => {
                debug!(email = %email, "requesting one-time code");
                let result = self.transport.request_code(&email).await;
                match &result {
                    Ok(()) => info!("one-time code sent"),
                    Err(error) => warn!(%error, "one-time code request failed"),
                }
                self.session.code_requested(result);
                None
            }
            PasscodeAction::ValidateCode { email, code } => {
                let result = self.transport.validate_code(&email, &code).await;
                if let Err(error) = &result {
                    warn!(%error, "one-time code rejected");
                }

                let credential = self.session.code_validated(result, Instant::now())?;
                self.tokens.set(credential.clone());
                info!("credential issued");
                for listener in &self.listeners {
                    listener(&credential);
                }
                Some(credential)
            }
        }
    }
}
