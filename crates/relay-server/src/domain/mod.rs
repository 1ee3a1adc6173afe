//! Domain layer for relay-server.
//!
//! Contains pure types with no I/O dependencies:
//!
//! - [`config`] – [`RelayConfig`]: all runtime settings.
//! - [`messages`] – HTTP request and response bodies.

pub mod config;
pub mod messages;

pub use config::{RelayConfig, SidecarUrlError};
pub use messages::{
    BulkSendRequest, BulkSendResponse, DisconnectResponse, ErrorBody, QrResponse,
    SendMessageRequest, SendMessageResponse, StatusResponse,
};
