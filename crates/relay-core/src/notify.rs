//! Realtime notifications pushed to dashboards.
//!
//! Two event kinds exist, mirroring what the web dashboard listens for:
//!
//! - `qr` – the current challenge rendered as an image data URL.
//! - `status` – a human-readable status label.
//!
//! On the wire a notification is a JSON object with `event` and `payload`
//! fields:
//!
//! ```json
//! {"event":"status","payload":"Connected"}
//! ```

use serde::Serialize;

use crate::session::SessionState;

/// Status label broadcast on the `status` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatusLabel {
    #[serde(rename = "QR Code Ready")]
    QrCodeReady,
    #[serde(rename = "Connected")]
    Connected,
    #[serde(rename = "Authentication Failure")]
    AuthenticationFailure,
    #[serde(rename = "Disconnected")]
    Disconnected,
    #[serde(rename = "Error")]
    Error,
}

impl StatusLabel {
    /// Returns the label text.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::QrCodeReady => "QR Code Ready",
            StatusLabel::Connected => "Connected",
            StatusLabel::AuthenticationFailure => "Authentication Failure",
            StatusLabel::Disconnected => "Disconnected",
            StatusLabel::Error => "Error",
        }
    }
}

impl From<SessionState> for StatusLabel {
    /// Maps a session state to the label a newly connected dashboard should see.
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Disconnected => StatusLabel::Disconnected,
            SessionState::AwaitingAuthentication => StatusLabel::QrCodeReady,
            SessionState::Connected => StatusLabel::Connected,
            SessionState::AuthFailure => StatusLabel::AuthenticationFailure,
            SessionState::Error => StatusLabel::Error,
        }
    }
}

/// One realtime notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    /// A fresh challenge, already encoded as an image data URL.
    Qr(String),
    /// A status change.
    Status(StatusLabel),
}
