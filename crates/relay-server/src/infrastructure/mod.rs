//! Infrastructure layer for relay-server.
//!
//! Implements the application ports against the real world and exposes the
//! relay over HTTP:
//!
//! - **`http_api`** – axum router: REST endpoints, CORS, `/ws` notifications.
//! - **`notify_hub`** – [`NotificationHub`], the broadcast `NotificationSink`.
//! - **`sidecar`** – [`SidecarDriver`], the `ChannelDriver` that talks to the
//!   browser-automation sidecar, and the sidecar process launcher.
//! - **`credentials`** – [`FsCredentialStore`].
//! - **`challenge`** – [`QrChallengeEncoder`].
//! - **`config_file`** – optional TOML configuration.
//! - **`shutdown`** – signal handling and the force-exit watchdog.
//! - **`mock`** – in-memory collaborators used by the tests.

pub mod challenge;
pub mod config_file;
pub mod credentials;
pub mod http_api;
pub mod mock;
pub mod notify_hub;
pub mod shutdown;
pub mod sidecar;

pub use challenge::QrChallengeEncoder;
pub use credentials::FsCredentialStore;
pub use http_api::{build_router, ApiState};
pub use notify_hub::NotificationHub;
pub use sidecar::{SidecarDriver, SidecarDriverConfig};
