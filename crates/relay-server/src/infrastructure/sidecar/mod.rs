//! Browser-automation sidecar.
//!
//! The chat network is driven through a headless browser that lives in a
//! separate Node.js process (the sidecar).  This module contains:
//!
//! - [`protocol`] – the JSON frames exchanged with the sidecar.
//! - [`driver`] – [`SidecarDriver`], the `ChannelDriver` implementation
//!   that talks to the sidecar over a WebSocket.
//! - [`process`] – optional spawning and supervision of the sidecar itself.

pub mod driver;
pub mod process;
pub mod protocol;

pub use driver::{SidecarDriver, SidecarDriverConfig};
pub use process::{start_sidecar, SidecarError, SidecarProcess, SidecarProcessConfig};
