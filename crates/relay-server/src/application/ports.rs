//! Collaborator contracts required by the application layer.
//!
//! Each trait has a production implementation in `infrastructure` and an
//! in-memory one in `infrastructure::mock`.

use std::io;

use async_trait::async_trait;
use relay_core::{ChannelAddress, DriverError, DriverEvent, Notification, SessionState};
use thiserror::Error;
use tokio::sync::broadcast;

/// The opaque component that actually talks to the chat network.
///
/// Only [`SessionManager`](super::SessionManager) calls the lifecycle
/// methods (`initialize`, `logout`, `destroy`).  The send pipeline limits
/// itself to `state`, `is_registered` and `send`.
#[async_trait]
pub trait ChannelDriver: Send + Sync {
    /// Starts (or restarts) the underlying session.
    async fn initialize(&self) -> Result<(), DriverError>;

    /// Returns the live session state, or `None` when the driver cannot tell.
    async fn state(&self) -> Result<Option<SessionState>, DriverError>;

    /// Returns whether the address has an account on the network.
    async fn is_registered(&self, address: &ChannelAddress) -> Result<bool, DriverError>;

    /// Sends a text message and returns the network's message id.
    async fn send(&self, address: &ChannelAddress, text: &str) -> Result<String, DriverError>;

    /// Logs the session out, invalidating its credentials.
    async fn logout(&self) -> Result<(), DriverError>;

    /// Tears the driver down.  Called once during shutdown.
    async fn destroy(&self) -> Result<(), DriverError>;

    /// Subscribes to lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<DriverEvent>;
}

/// Write-only broadcast channel towards dashboards.
///
/// Delivery is fire-and-forget: `emit` never blocks and never fails.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, notification: Notification);
}

/// Persistent storage of the session credential blob.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Deletes the blob.  An already absent blob is not an error.
    async fn purge(&self) -> io::Result<()>;
}

/// The challenge token could not be rendered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to encode challenge: {0}")]
pub struct ChallengeEncodeError(pub String);

/// Renders a raw challenge token as an image a human can scan.
pub trait ChallengeEncoder: Send + Sync {
    /// Returns the image as a `data:` URL.
    fn encode(&self, token: &str) -> Result<String, ChallengeEncodeError>;

    /// Renders the challenge as text for a terminal, if supported.
    fn terminal(&self, _token: &str) -> Option<String> {
        None
    }
}
