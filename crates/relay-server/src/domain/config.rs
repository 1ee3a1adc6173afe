//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is assembled at startup from (in increasing precedence) built-in
//! defaults, an optional TOML file, environment variables and CLI flags.
//!
//! Backoff constants, retry caps and the bulk-send delay window are not part
//! of the configuration; they live in `relay_core` as fixed constants.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default origin allowed by CORS (the dashboard dev server).
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";

/// Default URL of the browser-automation sidecar.
pub const DEFAULT_SIDECAR_URL: &str = "ws://127.0.0.1:8002";

/// How long shutdown may take before the process force-exits.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// The sidecar URL could not be turned into a port to listen on.
#[derive(Debug, Error)]
pub enum SidecarUrlError {
    #[error("invalid sidecar URL '{url}': {source}")]
    Malformed {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("sidecar URL '{0}' has no port and its scheme has no default")]
    NoPort(String),
}

/// All runtime configuration for the relay.
///
/// # Example
///
/// ```rust
/// use relay_server::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.http_bind_addr.port(), 8001);
/// assert_eq!(cfg.sidecar_port().unwrap(), 8002);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket facade listens on.
    pub http_bind_addr: SocketAddr,

    /// Where the channel driver persists session credentials.
    ///
    /// Deleted at startup and whenever the credentials become invalid.
    pub auth_path: PathBuf,

    /// Optional browser executable handed to the sidecar.
    pub browser_executable: Option<PathBuf>,

    /// WebSocket URL of the browser-automation sidecar.
    pub sidecar_url: String,

    /// Sidecar script to spawn with `node`.  `None` means the sidecar is
    /// managed externally.
    pub sidecar_script: Option<PathBuf>,

    /// Origins allowed to call the HTTP API from a browser.
    pub allowed_origins: Vec<String>,

    /// Upper bound on any single driver request.
    pub driver_timeout: Duration,

    /// Upper bound on graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl RelayConfig {
    /// Returns the port of [`RelayConfig::sidecar_url`], falling back to the
    /// scheme's default (`ws` is 80, `wss` is 443).
    ///
    /// # Errors
    ///
    /// Returns [`SidecarUrlError`] if the URL does not parse or names a
    /// scheme without a known default port.
    pub fn sidecar_port(&self) -> Result<u16, SidecarUrlError> {
        let url = Url::parse(&self.sidecar_url).map_err(|source| SidecarUrlError::Malformed {
            url: self.sidecar_url.clone(),
            source,
        })?;
        url.port_or_known_default()
            .ok_or_else(|| SidecarUrlError::NoPort(self.sidecar_url.clone()))
    }
}

impl Default for RelayConfig {
    /// | Field              | Default                 |
    /// |--------------------|-------------------------|
    /// | http_bind_addr     | `0.0.0.0:8001`          |
    /// | auth_path          | `./auth_wwebjs`         |
    /// | browser_executable | none                    |
    /// | sidecar_url        | `ws://127.0.0.1:8002`   |
    /// | sidecar_script     | none                    |
    /// | allowed_origins    | `http://localhost:5173` |
    /// | driver_timeout     | 60 seconds              |
    /// | shutdown_timeout   | 10 seconds              |
    fn default() -> Self {
        Self {
            http_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            auth_path: PathBuf::from("./auth_wwebjs"),
            browser_executable: None,
            sidecar_url: DEFAULT_SIDECAR_URL.to_string(),
            sidecar_script: None,
            allowed_origins: vec![DEFAULT_ALLOWED_ORIGIN.to_string()],
            driver_timeout: Duration::from_secs(60),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listens_on_all_interfaces_port_8001() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.http_bind_addr.to_string(), "0.0.0.0:8001");
    }

    #[test]
    fn test_default_allows_dashboard_dev_origin_only() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.allowed_origins, vec!["http://localhost:5173".to_string()]);
    }

    #[test]
    fn test_default_timeouts() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.driver_timeout, Duration::from_secs(60));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_sidecar_port_parsed_from_url_with_path() {
        // Arrange
        let cfg = RelayConfig {
            sidecar_url: "ws://10.0.0.7:9100/relay".to_string(),
            ..RelayConfig::default()
        };

        // Act / Assert
        assert_eq!(cfg.sidecar_port().unwrap(), 9100);
    }

    #[test]
    fn test_sidecar_port_defaults_from_scheme() {
        let ws = RelayConfig {
            sidecar_url: "ws://localhost".to_string(),
            ..RelayConfig::default()
        };
        let wss = RelayConfig {
            sidecar_url: "wss://sidecar.internal/relay".to_string(),
            ..RelayConfig::default()
        };

        assert_eq!(ws.sidecar_port().unwrap(), 80);
        assert_eq!(wss.sidecar_port().unwrap(), 443);
    }

    #[test]
    fn test_sidecar_port_ignores_userinfo() {
        let cfg = RelayConfig {
            sidecar_url: "ws://relay:secret@127.0.0.1:8100".to_string(),
            ..RelayConfig::default()
        };
        assert_eq!(cfg.sidecar_port().unwrap(), 8100);
    }

    #[test]
    fn test_sidecar_port_malformed_url_is_reported() {
        // Arrange: no scheme at all
        let cfg = RelayConfig {
            sidecar_url: "127.0.0.1:8002".to_string(),
            ..RelayConfig::default()
        };

        // Act
        let result = cfg.sidecar_port();

        // Assert
        assert!(matches!(result, Err(SidecarUrlError::Malformed { .. })));
    }

    #[test]
    fn test_sidecar_port_unknown_scheme_without_port_is_an_error() {
        let cfg = RelayConfig {
            sidecar_url: "sidecar://localhost".to_string(),
            ..RelayConfig::default()
        };
        assert!(matches!(cfg.sidecar_port(), Err(SidecarUrlError::NoPort(_))));
    }
}
