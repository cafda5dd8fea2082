use parley_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no conversation is entered")]
    NoConversation,
    #[error("not signed in")]
    NotAuthenticated,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type ClientResult<T> = Result<T, ClientError>;
