//! Optional TOML configuration file.
//!
//! Everything the CLI accepts can also be given in a file passed with
//! `--config`.  CLI flags and environment variables win over the file; the
//! file wins over built-in defaults.
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1"
//! port = 8001
//! allowed_origins = ["http://localhost:5173", "https://dash.example.com"]
//!
//! [session]
//! auth_path = "/var/lib/chat-relay/auth"
//! driver_timeout_secs = 60
//!
//! [sidecar]
//! url = "ws://127.0.0.1:8002"
//! script = "/opt/chat-relay/sidecar/index.js"
//! browser_executable = "/usr/bin/chromium"
//! ```
//!
//! Fields annotated with `#[serde(default = "...")]` fall back to the
//! default when absent, so a partial file is always valid.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::config::{RelayConfig, DEFAULT_ALLOWED_ORIGIN, DEFAULT_SIDECAR_URL};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `server.bind_address` is not an IP address.
    #[error("invalid bind address: '{0}'")]
    InvalidBindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub sidecar: SidecarSection,
}

/// HTTP facade settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Session and driver settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_auth_path")]
    pub auth_path: PathBuf,
    #[serde(default = "default_driver_timeout_secs")]
    pub driver_timeout_secs: u64,
}

/// Browser-automation sidecar settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SidecarSection {
    #[serde(default = "default_sidecar_url")]
    pub url: String,
    #[serde(default)]
    pub script: Option<PathBuf>,
    #[serde(default)]
    pub browser_executable: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8001
}
fn default_allowed_origins() -> Vec<String> {
    vec![DEFAULT_ALLOWED_ORIGIN.to_string()]
}
fn default_auth_path() -> PathBuf {
    PathBuf::from("./auth_wwebjs")
}
fn default_driver_timeout_secs() -> u64 {
    60
}
fn default_sidecar_url() -> String {
    DEFAULT_SIDECAR_URL.to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            auth_path: default_auth_path(),
            driver_timeout_secs: default_driver_timeout_secs(),
        }
    }
}

impl Default for SidecarSection {
    fn default() -> Self {
        Self {
            url: default_sidecar_url(),
            script: None,
            browser_executable: None,
        }
    }
}

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or wrong field types.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Converts the file contents into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if `server.bind_address`
    /// is not an IP address.
    pub fn into_relay_config(self) -> Result<RelayConfig, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind_address.clone()))?;

        Ok(RelayConfig {
            http_bind_addr: SocketAddr::new(ip, self.server.port),
            auth_path: self.session.auth_path,
            browser_executable: self.sidecar.browser_executable,
            sidecar_url: self.sidecar.url,
            sidecar_script: self.sidecar.script,
            allowed_origins: self.server.allowed_origins,
            driver_timeout: Duration::from_secs(self.session.driver_timeout_secs),
            ..RelayConfig::default()
        })
    }
}

/// Reads and converts the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read, parsed or converted.
pub async fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    FileConfig::from_toml(&text)?.into_relay_config()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
