//! # Parley Auth Crate
//!
//! Email + one-time-passcode login and the process-wide credential slot.
//!
//! - [`PasscodeSession`]: pure state machine for email entry, six-slot code
//!   entry and validation
//! - [`PasscodeFlow`]: runs the session's requests against a `Transport`
//! - [`TokenStore`]: current credential, observable by the channel layer

pub mod error;
pub mod flow;
pub mod passcode;
pub mod token;

pub use error::PasscodeError;
pub use flow::{CredentialListener, PasscodeFlow};
pub use passcode::{PasscodeAction, PasscodeSession, PasscodeStep, CODE_LENGTH, DEFAULT_ERROR_FLASH};
pub use token::TokenStore;
