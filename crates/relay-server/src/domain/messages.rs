//! HTTP request and response bodies.
//!
//! Request fields are optional on purpose: a missing field must produce the
//! relay's own `400` message rather than a generic deserialization error.
//!
//! # Wire examples
//!
//! ```json
//! // POST /api/send-message
//! {"recipient": "+1 555 000 1111", "message": "hi"}
//! // → 200
//! {"success": true, "messageId": "3EB0C431", "recipient": "+1 555 000 1111"}
//!
//! // POST /api/send-bulk
//! {"numbers": ["+1 555 000 1111", 15550002222], "message": "hi"}
//! // → 200
//! {"results": [{"to": "+1 555 000 1111", "success": true, "messageId": "..."}, ...]}
//! ```

use relay_core::{SendResult, SessionState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/send-message`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /api/send-bulk`.
///
/// `numbers` is kept as raw JSON values so numeric entries
/// (`15550001111`) are accepted alongside strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkSendRequest {
    #[serde(default)]
    pub numbers: Option<Vec<Value>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl BulkSendRequest {
    /// Returns the recipients as strings, in input order.
    ///
    /// Strings are kept verbatim, numbers are rendered in decimal, anything
    /// else becomes its JSON text (and will fail recipient validation).
    pub fn recipients(&self) -> Vec<String> {
        self.numbers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

/// Response of `GET /api/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: SessionState,
}

/// Response of `GET /api/qr`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QrResponse {
    pub qr: String,
}

/// Successful response of `POST /api/send-message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: String,
    pub recipient: String,
}

/// Response of `POST /api/send-bulk`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkSendResponse {
    pub results: Vec<SendResult>,
}

/// Successful response of `POST /api/disconnect`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: String,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
