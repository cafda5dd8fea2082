//! One-time-passcode login state machine.
//!
//! [`PasscodeSession`] holds no I/O: every transition returns the request the
//! driver has to issue (if any), and the driver reports the outcome back through
//! [`PasscodeSession::code_requested`] or [`PasscodeSession::code_validated`].
//! Focus tracking is exposed as plain indices for the presentation layer.

use std::time::{Duration, Instant};

use parley_transport::{Credential, TransportError};
use tracing::debug;

use crate::error::PasscodeError;

/// Number of single-digit slots in a one-time code.
pub const CODE_LENGTH: usize = 6;

pub const DEFAULT_ERROR_FLASH: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasscodeStep {
    CollectEmail,
    AwaitingCodeRequest,
    CollectCode,
    Validating,
    Authenticated,
}

/// Request the driver must issue on behalf of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasscodeAction {
    RequestCode { email: String },
    ValidateCode { email: String, code: String },
}

#[derive(Debug, Clone)]
pub struct PasscodeSession {
    email: String,
    slots: [Option<char>; CODE_LENGTH],
    focus: usize,
    step: PasscodeStep,
    in_flight: bool,
    last_error: Option<PasscodeError>,
    error_flash: Duration,
    error_flash_until: Option<Instant>,
}

impl Default for PasscodeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PasscodeSession {
    pub fn new() -> Self {
        Self::with_error_flash(DEFAULT_ERROR_FLASH)
    }

    pub fn with_error_flash(error_flash: Duration) -> Self {
        Self {
            email: String::new(),
            slots: [None; CODE_LENGTH],
            focus: 0,
            step: PasscodeStep::CollectEmail,
            in_flight: false,
            last_error: None,
            error_flash,
            error_flash_until: None,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn step(&self) -> PasscodeStep {
        self.step
    }

    pub fn slots(&self) -> &[Option<char>; CODE_LENGTH] {
        &self.slots
    }

    /// Slot that currently owns input focus.
    pub fn focus(&self) -> usize {
        self.focus
    }

    /// First empty slot, the only one a segmented input leaves editable.
    pub fn active_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn last_error(&self) -> Option<&PasscodeError> {
        self.last_error.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// The entered code once every slot is filled.
    pub fn code(&self) -> Option<String> {
        self.slots.iter().copied().collect()
    }

    /// Whether the input group should still show the rejected-code indication.
    pub fn is_error_flashing(&self, now: Instant) -> bool {
        self.error_flash_until.is_some_and(|until| now < until)
    }

    /// Drop an expired error indication; returns `true` if one was cleared.
    pub fn clear_expired_flash(&mut self, now: Instant) -> bool {
        match self.error_flash_until {
            Some(until) if now >= until => {
                self.error_flash_until = None;
                true
            }
            _ => false,
        }
    }

    pub fn submit_email(&mut self, email: &str) -> Option<PasscodeAction> {
        if self.step != PasscodeStep::CollectEmail || self.in_flight {
            return None;
        }

        let email = email.trim();
        self.email = email.to_owned();
        if email.is_empty() {
            self.last_error = Some(PasscodeError::MissingEmail);
            return None;
        }

        self.step = PasscodeStep::AwaitingCodeRequest;
        self.in_flight = true;
        self.last_error = None;
        Some(PasscodeAction::RequestCode {
            email: self.email.clone(),
        })
    }

    pub fn code_requested(&mut self, result: Result<(), TransportError>) {
        if self.step != PasscodeStep::AwaitingCodeRequest {
            debug!(step = ?self.step, "ignoring code request result outside of request");
            return;
        }

        self.in_flight = false;
        match result {
            Ok(()) => {
                self.step = PasscodeStep::CollectCode;
                self.clear_slots();
                self.last_error = None;
            }
            Err(err) => {
                self.step = PasscodeStep::CollectEmail;
                self.last_error = Some(PasscodeError::CodeRequestFailed(err));
            }
        }
    }

    /// Store one digit. Filling the last slot of a complete code starts validation.
    pub fn submit_digit(&mut self, index: usize, value: &str) -> Option<PasscodeAction> {
        if !self.accepts_input(index) {
            return None;
        }

        let mut chars = value.chars();
        let digit = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_digit() => c,
            _ => return None,
        };

        self.slots[index] = Some(digit);
        if index < CODE_LENGTH - 1 {
            self.focus = index + 1;
            return None;
        }

        self.focus = index;
        self.recheck()
    }

    pub fn backspace(&mut self, index: usize) {
        if !self.accepts_input(index) {
            return;
        }

        if self.slots[index].is_some() {
            self.slots[index] = None;
            self.focus = index;
        } else if index > 0 {
            self.slots[index - 1] = None;
            self.focus = index - 1;
        }
    }

    /// Reactive re-check: validate once a complete code is sitting idle.
    pub fn recheck(&mut self) -> Option<PasscodeAction> {
        if self.step != PasscodeStep::CollectCode || self.in_flight {
            return None;
        }

        let code = self.code()?;
        self.step = PasscodeStep::Validating;
        self.in_flight = true;
        self.last_error = None;
        Some(PasscodeAction::ValidateCode {
            email: self.email.clone(),
            code,
        })
    }

    /// Explicit submit: re-sends the email while collecting it, validates a
    /// complete code otherwise.
    pub fn submit_code(&mut self) -> Option<PasscodeAction> {
        match self.step {
            PasscodeStep::CollectEmail => {
                let email = self.email.clone();
                self.submit_email(&email)
            }
            PasscodeStep::CollectCode => self.recheck(),
            _ => None,
        }
    }

    /// Apply the validation outcome. Returns the credential on success.
    pub fn code_validated(
        &mut self,
        result: Result<Credential, TransportError>,
        now: Instant,
    ) -> Option<Credential> {
        if self.step != PasscodeStep::Validating {
            debug!(step = ?self.step, "ignoring validation result outside of validation");
            return None;
        }

        self.in_flight = false;
        match result {
            Ok(credential) => {
                self.step = PasscodeStep::Authenticated;
                self.last_error = None;
                self.error_flash_until = None;
                Some(credential)
            }
            Err(err) => {
                self.step = PasscodeStep::CollectCode;
                self.clear_slots();
                self.last_error = Some(PasscodeError::from_validation(err));
                self.error_flash_until = Some(now + self.error_flash);
                None
            }
        }
    }

    /// Discard the attempt and start over from email entry.
    pub fn reset(&mut self) {
        *self = Self::with_error_flash(self.error_flash);
    }

    fn accepts_input(&self, index: usize) -> bool {
        self.step == PasscodeStep::CollectCode && !self.in_flight && index < CODE_LENGTH
    }

    fn clear_slots(&mut self) {
        self.slots = [None; CODE_LENGTH];
        self.focus = 0;
    }
}
