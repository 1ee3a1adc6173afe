//! SendPipeline: validation, readiness gating and paced bulk dispatch.
//!
//! Every send goes through four checks, in order, stopping at the first
//! failure:
//!
//! 1. the recipient normalizes to a valid [`ChannelAddress`];
//! 2. the driver reports the session as `connected`;
//! 3. the recipient is registered on the network;
//! 4. the driver accepts the message.
//!
//! The driver's `send` is never reached unless 1–3 pass.  Failures of any of
//! the four become a failed [`SendResult`]; only missing arguments are
//! reported as errors ([`InputError`]).
//!
//! Bulk sends are deliberately slow: recipients are handled one at a time with
//! a random pause of 3–5 s between them so the network's abuse detection is
//! not triggered.  Only one bulk run may be in flight at a time; concurrent
//! callers queue behind it.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use relay_core::send::{BULK_DELAY_MAX, BULK_DELAY_MIN};
use relay_core::{ChannelAddress, SendErrorKind, SendResult, SessionState};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::error::InputError;
use super::ports::ChannelDriver;

/// Pause drawn between two consecutive bulk sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    min: Duration,
    max: Duration,
}

impl Throttle {
    /// A throttle drawing uniformly from `[min, max)`.  When `max <= min`
    /// the delay is always `min`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Draws the next pause.
    pub fn next_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min_ms..max_ms))
    }
}

impl Default for Throttle {
    /// `[3000 ms, 5000 ms)`.
    fn default() -> Self {
        Self::new(BULK_DELAY_MIN, BULK_DELAY_MAX)
    }
}

/// Validates and dispatches outbound messages.
pub struct SendPipeline {
    driver: Arc<dyn ChannelDriver>,
    throttle: Throttle,
    bulk_gate: Mutex<()>,
}

impl SendPipeline {
    /// Creates a pipeline with the default bulk throttle.
    pub fn new(driver: Arc<dyn ChannelDriver>) -> Self {
        Self::with_throttle(driver, Throttle::default())
    }

    /// Creates a pipeline with a custom bulk throttle.
    pub fn with_throttle(driver: Arc<dyn ChannelDriver>, throttle: Throttle) -> Self {
        Self {
            driver,
            throttle,
            bulk_gate: Mutex::new(()),
        }
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if the recipient or the text is empty.  Every
    /// other failure is reported inside the returned [`SendResult`].
    pub async fn send_one(&self, recipient: &str, text: &str) -> Result<SendResult, InputError> {
        if recipient.trim().is_empty() {
            return Err(InputError::MissingRecipient);
        }
        if text.trim().is_empty() {
            return Err(InputError::MissingMessage);
        }
        Ok(self.dispatch(recipient, text).await)
    }

    /// Sends the same message to several recipients, in order, pausing
    /// between sends.
    ///
    /// The result has exactly one entry per recipient, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if the list is empty or the text is empty.
    pub async fn send_many(
        &self,
        recipients: &[String],
        text: &str,
    ) -> Result<Vec<SendResult>, InputError> {
        if recipients.is_empty() {
            return Err(InputError::EmptyRecipients);
        }
        if text.trim().is_empty() {
            return Err(InputError::MissingMessage);
        }

        let _bulk = self.bulk_gate.lock().await;
        info!(count = recipients.len(), "starting bulk send");

        let mut results = Vec::with_capacity(recipients.len());
        for (index, recipient) in recipients.iter().enumerate() {
            results.push(self.dispatch(recipient, text).await);

            if index + 1 < recipients.len() {
                let pause = self.throttle.next_delay();
                info!(
                    delay_ms = pause.as_millis() as u64,
                    "waiting before next recipient"
                );
                tokio::time::sleep(pause).await;
            }
        }

        let sent = results.iter().filter(|r| r.success).count();
        info!(sent, failed = results.len() - sent, "bulk send finished");
        Ok(results)
    }

    async fn dispatch(&self, recipient: &str, text: &str) -> SendResult {
        let address = match ChannelAddress::parse(recipient) {
            Ok(address) => address,
            Err(e) => {
                warn!(recipient, "rejected recipient: {e}");
                return SendResult::failed(recipient, SendErrorKind::InvalidRecipient, e.to_string());
            }
        };

        match self.driver.state().await {
            Ok(Some(SessionState::Connected)) => {}
            Ok(state) => {
                let state = state.map_or("unknown", |s| s.as_str());
                warn!(recipient, state, "session not ready, message not sent");
                return SendResult::failed(
                    recipient,
                    SendErrorKind::NotReady,
                    format!("Client not ready, current state: {state}"),
                );
            }
            Err(e) => {
                warn!(recipient, error = %e, "session state unavailable, message not sent");
                return SendResult::failed(
                    recipient,
                    SendErrorKind::NotReady,
                    format!("Client not ready: {e}"),
                );
            }
        }

        match self.driver.is_registered(&address).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(recipient, "recipient not registered on the network");
                return SendResult::failed(
                    recipient,
                    SendErrorKind::UnregisteredRecipient,
                    format!("Number {recipient} is not registered on the network"),
                );
            }
            Err(e) => {
                warn!(recipient, error = %e, "registration lookup failed");
                return SendResult::failed(recipient, SendErrorKind::Transport, e.to_string());
            }
        }

        match self.driver.send(&address, text).await {
            Ok(message_id) => {
                info!(recipient, %address, %message_id, "message sent");
                SendResult::sent(recipient, message_id)
            }
            Err(e) => {
                warn!(recipient, %address, error = %e, "message send failed");
                SendResult::failed(recipient, SendErrorKind::Transport, e.to_string())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
