//! relay-server library crate.
//!
//! This crate keeps one chat-network session alive and exposes it to HTTP
//! callers and realtime dashboards.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Dashboard / API caller (HTTP + WebSocket)
//!         ↕
//! [relay-server]
//!   ├── domain/           Pure types: RelayConfig, HTTP request/response DTOs
//!   ├── application/      SessionManager, SendPipeline, collaborator ports
//!   └── infrastructure/
//!         ├── http_api     axum routes, CORS, realtime WebSocket endpoint
//!         ├── notify_hub   broadcast fan-out of qr/status notifications
//!         ├── sidecar/     channel driver speaking JSON to the automation sidecar
//!         ├── credentials  filesystem credential store
//!         ├── challenge    QR code rendering
//!         ├── config_file  optional TOML configuration
//!         ├── shutdown     signal handling and the force-exit watchdog
//!         └── mock         in-memory collaborators for tests
//!         ↕
//! browser-automation sidecar (JSON over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `relay-core`; it talks to the
//!   outside world only through the traits in [`application::ports`].
//! - `infrastructure` implements those traits with tokio, axum and
//!   tokio-tungstenite.

/// Domain layer: configuration and wire DTOs (no I/O).
pub mod domain;

/// Application layer: session supervision and the send pipeline.
pub mod application;

/// Infrastructure layer: HTTP facade, sidecar driver, storage.
pub mod infrastructure;
