use parley_transport::TransportError;
use thiserror::Error;

/// Failure surfaced on the passcode session for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasscodeError {
    #[error("enter an email address")]
    MissingEmail,

    #[error("failed to send one-time code: {0}")]
    CodeRequestFailed(TransportError),

    #[error("invalid one-time code, enter the new code")]
    InvalidCode,

    #[error("could not validate code: {0}")]
    ValidationFailed(TransportError),
}

impl PasscodeError {
    pub(crate) fn from_validation(err: TransportError) -> Self {
        match err {
            TransportError::InvalidCode => Self::InvalidCode,
            other => Self::ValidationFailed(other),
        }
    }
}
