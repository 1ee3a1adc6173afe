//! Chat-Relay server: entry point.
//!
//! This binary keeps one chat-network session alive and exposes it over
//! HTTP.  Outbound messages are submitted through a small REST API;
//! dashboards follow the session (QR code to scan, connected, logged out...)
//! over a WebSocket.
//!
//! # Usage
//!
//! ```text
//! chat-relay [OPTIONS]
//!
//! Options:
//!   --config <FILE>                 TOML configuration file
//!   --bind <IP>                     HTTP bind address [default: 0.0.0.0]
//!   --port <PORT>                   HTTP port [default: 8001]
//!   --auth-path <DIR>               Credential storage [default: ./auth_wwebjs]
//!   --browser-executable <FILE>     Browser for the sidecar
//!   --sidecar-url <URL>             Sidecar WebSocket [default: ws://127.0.0.1:8002]
//!   --sidecar-script <FILE>         Spawn the sidecar with node
//!   --allowed-origin <ORIGIN>       CORS origin, repeatable [default: http://localhost:5173]
//!   --driver-timeout <SECS>         Sidecar request timeout [default: 60]
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence over environment variables, which take
//! precedence over the configuration file.
//!
//! | Variable                    | Flag                   |
//! |-----------------------------|------------------------|
//! | `RELAY_BIND`                | `--bind`               |
//! | `PORT`                      | `--port`               |
//! | `WWEBJS_STORAGE_PATH`       | `--auth-path`          |
//! | `PUPPETEER_EXECUTABLE_PATH` | `--browser-executable` |
//! | `RELAY_SIDECAR_URL`         | `--sidecar-url`        |
//! | `RELAY_SIDECAR_SCRIPT`      | `--sidecar-script`     |
//! | `RELAY_ALLOWED_ORIGINS`     | `--allowed-origin` (comma-separated) |
//! | `RELAY_DRIVER_TIMEOUT`      | `--driver-timeout`     |
//!
//! # Shutdown
//!
//! On SIGINT/SIGTERM the HTTP server stops accepting requests, the session
//! manager destroys the driver and the sidecar is stopped.  If that takes
//! longer than 10 seconds the process exits with code 1; a failed driver
//! teardown also exits with code 1.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_server::application::{SendPipeline, SessionManager};
use relay_server::domain::RelayConfig;
use relay_server::infrastructure::config_file::load_config;
use relay_server::infrastructure::shutdown::shutdown_signal;
use relay_server::infrastructure::sidecar::{start_sidecar, SidecarProcessConfig};
use relay_server::infrastructure::{
    build_router, ApiState, FsCredentialStore, NotificationHub, QrChallengeEncoder,
    SidecarDriver, SidecarDriverConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Chat-Relay: HTTP facade for a single chat-network session.
///
/// Every option is optional; unset options fall back to the configuration
/// file (if any), then to built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "chat-relay",
    about = "HTTP/realtime relay for a single chat-network session",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// IP address to bind the HTTP server to.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// HTTP port.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Directory where the session credentials are stored.
    ///
    /// Deleted at startup and whenever the credentials become invalid.
    #[arg(long, env = "WWEBJS_STORAGE_PATH")]
    auth_path: Option<PathBuf>,

    /// Browser executable used by the sidecar.
    #[arg(long, env = "PUPPETEER_EXECUTABLE_PATH")]
    browser_executable: Option<PathBuf>,

    /// WebSocket URL of the browser-automation sidecar.
    #[arg(long, env = "RELAY_SIDECAR_URL")]
    sidecar_url: Option<String>,

    /// Sidecar script to spawn with `node`.  Without it, the sidecar is
    /// expected to be running already.
    #[arg(long, env = "RELAY_SIDECAR_SCRIPT")]
    sidecar_script: Option<PathBuf>,

    /// Origin allowed to call the API from a browser.  Repeatable.
    #[arg(long = "allowed-origin", env = "RELAY_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Sidecar request timeout in seconds.
    #[arg(long, env = "RELAY_DRIVER_TIMEOUT")]
    driver_timeout: Option<u64>,
}

impl Cli {
    /// Applies the CLI/environment values on top of `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address.
    fn apply_to(self, mut base: RelayConfig) -> anyhow::Result<RelayConfig> {
        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
            base.http_bind_addr = SocketAddr::new(ip, base.http_bind_addr.port());
        }
        if let Some(port) = self.port {
            base.http_bind_addr.set_port(port);
        }
        if let Some(auth_path) = self.auth_path {
            base.auth_path = auth_path;
        }
        if self.browser_executable.is_some() {
            base.browser_executable = self.browser_executable;
        }
        if let Some(url) = self.sidecar_url {
            base.sidecar_url = url;
        }
        if self.sidecar_script.is_some() {
            base.sidecar_script = self.sidecar_script;
        }
        let origins: Vec<String> = self
            .allowed_origins
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if !origins.is_empty() {
            base.allowed_origins = origins;
        }
        if let Some(secs) = self.driver_timeout {
            base.driver_timeout = Duration::from_secs(secs);
        }
        Ok(base)
    }

    /// Builds the effective configuration: file (if any), then CLI/env.
    async fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let base = match &self.config {
            Some(path) => load_config(path)
                .await
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => RelayConfig::default(),
        };
        self.apply_to(base)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised from `RUST_LOG` (default `info`).
/// 2. The configuration is assembled from file, environment and CLI.
/// 3. The sidecar is spawned if a script was configured.
/// 4. The session manager starts: credentials are wiped and the driver is
///    initialized (with retries) in the background.
/// 5. The HTTP server runs until SIGINT/SIGTERM.
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_relay_config().await?;

    info!(
        "Chat-Relay starting: http={}, sidecar={}, auth_path={}",
        config.http_bind_addr,
        config.sidecar_url,
        config.auth_path.display()
    );

    // ── Sidecar process (optional) ────────────────────────────────────────────
    let mut sidecar = match &config.sidecar_script {
        Some(script) => {
            let port = config
                .sidecar_port()
                .context("cannot determine the sidecar port")?;
            let process = start_sidecar(SidecarProcessConfig {
                script: script.clone(),
                node_binary: "node".to_string(),
                port,
                auth_dir: config.auth_path.clone(),
                browser_executable: config.browser_executable.clone(),
            })
            .await
            .context("failed to start sidecar")?;
            Some(process)
        }
        None => None,
    };

    // ── Core services ─────────────────────────────────────────────────────────
    let driver = Arc::new(SidecarDriver::new(SidecarDriverConfig {
        url: config.sidecar_url.clone(),
        request_timeout: config.driver_timeout,
    }));
    let hub = NotificationHub::default();
    let session = SessionManager::start(
        driver.clone(),
        Arc::new(FsCredentialStore::new(config.auth_path.clone())),
        Arc::new(hub.clone()),
        Arc::new(QrChallengeEncoder::default()),
    )
    .await;
    let pipeline = Arc::new(SendPipeline::new(driver));

    // ── HTTP server ───────────────────────────────────────────────────────────
    let router = build_router(
        ApiState {
            session: Arc::clone(&session),
            pipeline,
            hub,
        },
        &config.allowed_origins,
    );
    let listener = tokio::net::TcpListener::bind(config.http_bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.http_bind_addr))?;
    info!("listening on http://{}", config.http_bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout))
        .await
        .context("HTTP server failed")?;
    info!("HTTP server stopped");

    // ── Teardown ──────────────────────────────────────────────────────────────
    let exit = match session.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("error during shutdown: {e}");
            ExitCode::FAILURE
        }
    };
    if let Some(process) = sidecar.as_mut() {
        process.stop().await;
    }

    info!("Chat-Relay stopped");
    Ok(exit)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_config_flag_has_no_config_file() {
        let cli = Cli::parse_from(["chat-relay"]);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_config_flag() {
        let cli = Cli::parse_from(["chat-relay", "--config", "/etc/chat-relay.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/chat-relay.toml")));
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["chat-relay", "--port", "9001"]);
        assert_eq!(cli.port, Some(9001));
    }

    #[test]
    fn test_cli_allowed_origin_is_repeatable() {
        let cli = Cli::parse_from([
            "chat-relay",
            "--allowed-origin",
            "http://a.example",
            "--allowed-origin",
            "http://b.example",
        ]);
        assert_eq!(cli.allowed_origins, vec!["http://a.example", "http://b.example"]);
    }

    #[test]
    fn test_cli_allowed_origin_accepts_comma_list() {
        let cli = Cli::parse_from(["chat-relay", "--allowed-origin", "http://a.example,http://b.example"]);
        assert_eq!(cli.allowed_origins.len(), 2);
    }

    #[test]
    fn test_apply_to_defaults_without_flags_is_identity() {
        // Arrange
        let cli = Cli::default();

        // Act
        let config = cli.apply_to(RelayConfig::default()).unwrap();

        // Assert
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_apply_to_overrides_bind_and_port() {
        let cli = Cli {
            bind: Some("127.0.0.1".into()),
            port: Some(8100),
            ..Cli::default()
        };

        let config = cli.apply_to(RelayConfig::default()).unwrap();

        assert_eq!(config.http_bind_addr.to_string(), "127.0.0.1:8100");
    }

    #[test]
    fn test_apply_to_keeps_file_values_for_unset_flags() {
        // Arrange: a base config as loaded from a file
        let base = RelayConfig {
            sidecar_url: "ws://10.0.0.2:9000".into(),
            driver_timeout: Duration::from_secs(90),
            ..RelayConfig::default()
        };
        let cli = Cli {
            auth_path: Some(PathBuf::from("/data/auth")),
            ..Cli::default()
        };

        // Act
        let config = cli.apply_to(base).unwrap();

        // Assert
        assert_eq!(config.sidecar_url, "ws://10.0.0.2:9000");
        assert_eq!(config.driver_timeout, Duration::from_secs(90));
        assert_eq!(config.auth_path, PathBuf::from("/data/auth"));
    }

    #[test]
    fn test_apply_to_replaces_origins_and_timeout() {
        let cli = Cli {
            allowed_origins: vec!["https://dash.example.com".into(), " ".into()],
            driver_timeout: Some(5),
            ..Cli::default()
        };

        let config = cli.apply_to(RelayConfig::default()).unwrap();

        assert_eq!(config.allowed_origins, vec!["https://dash.example.com"]);
        assert_eq!(config.driver_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_apply_to_invalid_bind_returns_error() {
        // Arrange: provide an invalid IP address string
        let cli = Cli {
            bind: Some("not.an.ip".into()),
            ..Cli::default()
        };

        // Act
        let result = cli.apply_to(RelayConfig::default());

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }
}
