//! Per-recipient send outcomes and bulk throttling bounds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lower bound (inclusive) of the pause between two bulk sends.
pub const BULK_DELAY_MIN: Duration = Duration::from_millis(3000);

/// Upper bound (exclusive) of the pause between two bulk sends.
pub const BULK_DELAY_MAX: Duration = Duration::from_millis(5000);

/// Why a send did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendErrorKind {
    /// Fewer than ten digits after normalization.  The driver was not called.
    InvalidRecipient,
    /// The session is not connected.
    NotReady,
    /// The number has no account on the network.
    UnregisteredRecipient,
    /// The driver failed while sending.
    Transport,
}

/// Outcome of one send attempt for one recipient.
///
/// Produced exactly once per recipient per request and never mutated after
/// creation.  Serializes as:
///
/// ```json
/// {"to":"+1 555 000 1111","success":true,"messageId":"3EB0C431"}
/// {"to":"123","success":false,"error":"Invalid phone number: 123","errorKind":"invalid_recipient"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    /// The recipient exactly as the caller supplied it.
    pub to: String,
    /// Whether the driver accepted the message.
    pub success: bool,
    /// Network message id, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Failure description, present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure category, present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<SendErrorKind>,
}

impl SendResult {
    /// A successful send.
    pub fn sent(to: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            success: true,
            message_id: Some(message_id.into()),
            error: None,
            error_kind: None,
        }
    }

    /// A failed send.
    pub fn failed(to: impl Into<String>, kind: SendErrorKind, error: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            success: false,
            message_id: None,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }
}
