//! Errors surfaced to callers of the application layer.
//!
//! Per-recipient send failures are not errors: they come back as a failed
//! [`SendResult`](relay_core::SendResult).  Session failures are not errors
//! either: the session manager turns them into state transitions.  What is
//! left is caller mistakes ([`InputError`]) and failures of an explicit
//! lifecycle request ([`RelayError`]).

use relay_core::DriverError;
use thiserror::Error;

use super::ports::ChallengeEncodeError;

/// A required argument was absent or empty.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("recipient is required")]
    MissingRecipient,

    #[error("message is required")]
    MissingMessage,

    #[error("at least one recipient is required")]
    EmptyRecipients,
}

/// Error type for facade-visible operations.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Challenge(#[from] ChallengeEncodeError),
}
