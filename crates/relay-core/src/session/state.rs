//! Session state and disconnect reason types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current state of the single chat-network session.
///
/// Exactly one value is live at a time.  It is owned by the session manager
/// and only changes in response to driver events (see
/// [`SessionMachine`](super::SessionMachine)).
///
/// ```text
/// Disconnected ──► AwaitingAuthentication ──► Connected
///      ▲                                          │
///      └──────── AuthFailure / Error / Disconnected ◄┘
/// ```
///
/// None of the non-`Connected` states is terminal: each one schedules a
/// recovery action, so the machine keeps running for as long as the process
/// is alive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session.  Initial state, and the state after a logout or drop.
    #[default]
    Disconnected,
    /// A challenge (QR code) was issued and is waiting to be scanned.
    AwaitingAuthentication,
    /// The session is authenticated and can send messages.
    Connected,
    /// The network rejected the stored credentials.
    AuthFailure,
    /// The driver reported an error or failed to initialize.
    Error,
}

impl SessionState {
    /// Returns the wire name used in HTTP responses (`"awaiting_authentication"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::AwaitingAuthentication => "awaiting_authentication",
            SessionState::Connected => "connected",
            SessionState::AuthFailure => "auth_failure",
            SessionState::Error => "error",
        }
    }

    /// Returns `true` only for [`SessionState::Connected`].
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the driver reported a disconnect.
///
/// `Logout` and `Banned` mean the stored credentials are permanently
/// invalid and must be deleted; anything else is treated as transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The account was logged out (from the phone or via the API).
    Logout,
    /// The account was banned by the network.
    Banned,
    /// Any other reason, kept verbatim for logging.
    Other(String),
}

impl DisconnectReason {
    /// Parses the driver's reason string.  Matching is case-insensitive.
    ///
    /// # Example
    ///
    /// ```rust
    /// use relay_core::DisconnectReason;
    ///
    /// assert_eq!(DisconnectReason::parse("LOGOUT"), DisconnectReason::Logout);
    /// assert_eq!(
    ///     DisconnectReason::parse("NAVIGATION"),
    ///     DisconnectReason::Other("NAVIGATION".to_string())
    /// );
    /// ```
    pub fn parse(reason: &str) -> Self {
        match reason.trim().to_ascii_uppercase().as_str() {
            "LOGOUT" => DisconnectReason::Logout,
            "BANNED" => DisconnectReason::Banned,
            _ => DisconnectReason::Other(reason.to_string()),
        }
    }

    /// Returns `true` when the credential blob must be deleted.
    pub fn invalidates_credentials(&self) -> bool {
        matches!(self, DisconnectReason::Logout | DisconnectReason::Banned)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Logout => f.write_str("LOGOUT"),
            DisconnectReason::Banned => f.write_str("BANNED"),
            DisconnectReason::Other(reason) => f.write_str(reason),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
