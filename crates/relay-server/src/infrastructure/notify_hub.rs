//! Broadcast fan-out of realtime notifications.
//!
//! The session manager emits into the hub; every open dashboard WebSocket
//! holds its own receiver.  Delivery is at-most-once: a subscriber that falls
//! more than `capacity` notifications behind skips the missed ones.

use relay_core::Notification;
use tokio::sync::broadcast;
use tracing::trace;

use crate::application::ports::NotificationSink;

/// Default number of buffered notifications per subscriber.
pub const DEFAULT_HUB_CAPACITY: usize = 64;

/// Cloneable handle to the notification broadcast channel.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Opens a new subscription that sees every notification emitted from
    /// now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

impl NotificationSink for NotificationHub {
    fn emit(&self, notification: Notification) {
        // An error only means nobody is listening.
        if self.tx.send(notification).is_err() {
            trace!("notification dropped, no subscribers");
        }
    }
}
