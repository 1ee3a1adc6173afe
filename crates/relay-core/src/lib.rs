//! # relay-core
//!
//! Shared library for Chat-Relay containing the session state machine, the
//! retry/backoff policy, recipient normalization rules, and the value types
//! that travel between the session manager, the send pipeline and the
//! realtime notification channel.
//!
//! This crate has zero dependencies on async runtimes, sockets, or the file
//! system.  Everything here can be unit tested without a live chat session.
//!
//! # Architecture overview (for beginners)
//!
//! Chat-Relay keeps exactly one session with a third-party chat network
//! alive and lets HTTP callers push outbound messages through it.  The hard
//! part is not sending a message; it is keeping the session alive through
//! authentication challenges, logouts, bans and crashes of the automation
//! layer underneath.
//!
//! This crate (`relay-core`) is the pure foundation.  It defines:
//!
//! - **`session`** – The connection state machine.  Every lifecycle signal
//!   from the channel driver becomes a [`SessionEvent`]; feeding it to
//!   [`SessionMachine::handle`] returns the new state plus a list of
//!   [`SessionAction`]s (notify, purge credentials, schedule a retry) that the
//!   async layer executes.
//!
//! - **`recipient`** – How a raw, user-typed phone number becomes a canonical
//!   channel address (and when it is rejected).
//!
//! - **`send`** – The per-recipient [`SendResult`] record and the bulk-send
//!   throttling window.
//!
//! - **`notify`** – The realtime `qr` / `status` notifications pushed to
//!   connected dashboards.
//!
//! - **`driver`** – Lifecycle events and errors reported by the channel
//!   driver, independent of how the driver talks to the network.

pub mod driver;
pub mod notify;
pub mod recipient;
pub mod send;
pub mod session;

// Re-export the most-used types at the crate root so callers can write
// `relay_core::SessionState` instead of `relay_core::session::state::SessionState`.
pub use driver::{DriverError, DriverEvent};
pub use notify::{Notification, StatusLabel};
pub use recipient::{ChannelAddress, InvalidRecipient, ADDRESS_SUFFIX, MIN_RECIPIENT_DIGITS};
pub use send::{SendErrorKind, SendResult};
pub use session::{
    DisconnectReason, RetryPolicy, SessionAction, SessionEvent, SessionMachine, SessionState,
};
