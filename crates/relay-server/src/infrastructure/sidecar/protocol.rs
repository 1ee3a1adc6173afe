//! JSON protocol spoken with the browser-automation sidecar.
//!
//! Every frame is a JSON text message with a `type` field.
//!
//! Requests (relay → sidecar) carry a `request_id`:
//!
//! ```json
//! {"type":"send","request_id":"6f1c…","chat_id":"15550001111@c.us","text":"hi"}
//! ```
//!
//! The sidecar answers each request exactly once:
//!
//! ```json
//! {"type":"response","request_id":"6f1c…","ok":true,"result":"3EB0C431"}
//! {"type":"response","request_id":"6f1c…","ok":false,"error":"Evaluation failed"}
//! ```
//!
//! and pushes lifecycle events at any time:
//!
//! ```json
//! {"type":"qr","code":"2@…"}
//! {"type":"ready"}
//! {"type":"auth_failure","message":"…"}
//! {"type":"disconnected","reason":"LOGOUT"}
//! {"type":"error","message":"…"}
//! {"type":"message","from":"15550001111@c.us","body":"…"}
//! ```
//!
//! Incoming chat messages are only logged by the relay.

use relay_core::{DriverError, DriverEvent, SessionState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The operation requested from the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarCall {
    Initialize,
    GetState,
    IsRegistered { chat_id: String },
    Send { chat_id: String, text: String },
    Logout,
    Destroy,
}

/// A request frame: a call plus its correlation id.
#[derive(Debug, Clone, Serialize)]
pub struct SidecarRequest {
    pub request_id: Uuid,
    #[serde(flatten)]
    pub call: SidecarCall,
}

/// Any frame received from the sidecar.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    Response {
        request_id: Uuid,
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Qr {
        code: String,
    },
    Ready,
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Message {
        #[serde(default)]
        from: String,
        #[serde(default)]
        body: String,
    },
}

impl SidecarMessage {
    /// Converts a pushed event into a [`DriverEvent`].  Responses and
    /// incoming messages yield `None`.
    pub fn into_event(self) -> Option<DriverEvent> {
        match self {
            SidecarMessage::Response { .. } | SidecarMessage::Message { .. } => None,
            SidecarMessage::Qr { code } => Some(DriverEvent::ChallengeIssued(code)),
            SidecarMessage::Ready => Some(DriverEvent::Ready),
            SidecarMessage::AuthFailure { message } => Some(DriverEvent::AuthFailed(message)),
            SidecarMessage::Disconnected { reason } => Some(DriverEvent::Disconnected(reason)),
            SidecarMessage::Error { message } => Some(DriverEvent::Error(message)),
        }
    }
}

/// Maps the network client's state string to a [`SessionState`].
///
/// Unknown states (including the transient `OPENING`/`PAIRING`) map to
/// `None` so the caller falls back to its own bookkeeping.
pub fn map_driver_state(raw: &str) -> Option<SessionState> {
    match raw {
        "CONNECTED" => Some(SessionState::Connected),
        "UNPAIRED" | "UNPAIRED_IDLE" => Some(SessionState::AwaitingAuthentication),
        "CONFLICT" | "TIMEOUT" | "DEPRECATED_VERSION" | "PROXYBLOCK" | "TOS_BLOCK"
        | "SMB_TOS_BLOCK" => Some(SessionState::Error),
        _ => None,
    }
}

/// Extracts the message id from a `send` result.
///
/// Accepts either a bare string or an object with an `id` string.
pub fn message_id(result: &Value) -> Result<String, DriverError> {
    result
        .as_str()
        .or_else(|| result.get("id").and_then(Value::as_str))
        .map(str::to_owned)
        .ok_or_else(|| DriverError::Protocol(format!("send result has no message id: {result}")))
}
