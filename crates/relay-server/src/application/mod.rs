//! Application layer use cases for the relay.
//!
//! # What use cases does the relay have?
//!
//! - **`session_manager`** – Owns the channel driver and keeps the single
//!   chat-network session alive.  Driver events are fed through the pure
//!   `relay_core::SessionMachine`; the resulting actions (notify dashboards,
//!   purge credentials, schedule a re-initialize) are executed here.
//!
//! - **`send_pipeline`** – Validates recipients, gates sends on session
//!   readiness and recipient registration, and paces bulk sends.
//!
//! Both talk to the outside world only through the traits in [`ports`],
//! which the infrastructure layer implements.

pub mod error;
pub mod ports;
pub mod send_pipeline;
pub mod session_manager;

pub use error::{InputError, RelayError};
pub use ports::{ChallengeEncodeError, ChallengeEncoder, ChannelDriver, CredentialStore, NotificationSink};
pub use send_pipeline::{SendPipeline, Throttle};
pub use session_manager::SessionManager;
