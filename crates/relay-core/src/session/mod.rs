//! Session lifecycle: state vocabulary, retry policy and the transition function.
//!
//! # Why a pure state machine? (for beginners)
//!
//! The channel driver reports lifecycle changes as push notifications (a QR
//! challenge was issued, the session became ready, the session was logged
//! out, ...).  Handling each of those inline, with timers and file deletion
//! mixed in, makes the behaviour impossible to test without a real network.
//!
//! Instead, every notification is turned into a [`SessionEvent`] and handed
//! to [`SessionMachine::handle`], which is an ordinary synchronous function:
//!
//! ```text
//! (state, event)  ──►  (new state, [actions])
//! ```
//!
//! The caller (the async `SessionManager` in `relay-server`) executes the
//! returned [`SessionAction`]s.  Tests can drive the machine with any event
//! sequence and assert on the exact actions produced.

pub mod machine;
pub mod retry;
pub mod state;

pub use machine::{SessionAction, SessionEvent, SessionMachine};
pub use retry::RetryPolicy;
pub use state::{DisconnectReason, SessionState};
