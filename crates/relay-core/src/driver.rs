//! Lifecycle events and errors reported by the channel driver.
//!
//! The driver is the opaque component that actually talks to the chat
//! network (browser automation, wire protocol, authentication handshake).
//! The core only sees the signals and failures defined here.

use std::time::Duration;

use thiserror::Error;

/// A lifecycle signal pushed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A fresh authentication challenge (raw QR token) was issued.
    ChallengeIssued(String),
    /// The session is authenticated and ready to send.
    Ready,
    /// Authentication failed; the message is driver-specific.
    AuthFailed(String),
    /// The session dropped; the reason string is driver-specific
    /// (`"LOGOUT"`, `"BANNED"`, ...).
    Disconnected(String),
    /// A runtime error that does not by itself end the session.
    Error(String),
}

/// Errors returned by driver calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The driver (or the process hosting it) cannot be reached.
    #[error("driver unavailable: {0}")]
    Unavailable(String),

    /// The driver did not answer within the request timeout.
    #[error("driver did not respond within {0:?}")]
    Timeout(Duration),

    /// The driver answered with a failure.
    #[error("{0}")]
    Rejected(String),

    /// The driver answered with something that could not be understood.
    #[error("driver protocol error: {0}")]
    Protocol(String),

    /// The connection to the driver closed while a call was in flight.
    #[error("driver connection closed")]
    ConnectionClosed,
}
