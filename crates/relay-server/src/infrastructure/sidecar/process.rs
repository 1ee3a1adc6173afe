//! Sidecar process management.
//!
//! When a sidecar script is configured the relay starts it with `node` and
//! owns its lifetime.  The sidecar's stdout and stderr are forwarded line by
//! line into `tracing` under the `relay_sidecar` target, so
//! `RUST_LOG=relay_sidecar=debug` shows exactly what the browser side is
//! doing.
//!
//! Node runs from the script's directory, so relative paths (the script
//! itself and the credential directory) are anchored to the relay's own
//! working directory before the command is built.  The relay purges the
//! credential directory at that same path.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// How long a freshly spawned sidecar must survive to count as started.
const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// How long `stop` waits for the sidecar to exit before killing it.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Error type for sidecar process management.
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("sidecar script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("failed to spawn sidecar: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("sidecar exited immediately with {0}")]
    ExitedEarly(ExitStatus),

    #[error("failed to check sidecar status: {0}")]
    Status(#[source] std::io::Error),

    #[error("cannot resolve the working directory: {0}")]
    WorkingDir(#[source] io::Error),
}

/// How to launch the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarProcessConfig {
    /// JavaScript entry point.
    pub script: PathBuf,
    /// Node.js binary.
    pub node_binary: String,
    /// Port the sidecar should listen on.
    pub port: u16,
    /// Credential directory, passed as `RELAY_AUTH_DIR`.
    pub auth_dir: PathBuf,
    /// Browser executable, passed as `RELAY_BROWSER_EXECUTABLE`.
    pub browser_executable: Option<PathBuf>,
}

impl SidecarProcessConfig {
    /// Builds the `node` command, resolving relative paths against `base`.
    fn command(&self, base: &Path) -> Command {
        let script = anchor(base, &self.script);
        let mut cmd = Command::new(&self.node_binary);
        cmd.arg(&script)
            .env("RELAY_SIDECAR_PORT", self.port.to_string())
            .env("RELAY_AUTH_DIR", anchor(base, &self.auth_dir))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = script.parent() {
            cmd.current_dir(dir);
        }
        if let Some(browser) = &self.browser_executable {
            cmd.env("RELAY_BROWSER_EXECUTABLE", anchor(base, browser));
        }
        cmd
    }
}

/// Joins a relative `path` onto `base`, dropping `.` components.
fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let mut anchored = base.to_path_buf();
    anchored.extend(path.components().filter(|c| !matches!(c, Component::CurDir)));
    anchored
}

/// Handle to a running sidecar process.
pub struct SidecarProcess {
    child: Child,
}

impl SidecarProcess {
    /// Waits for the sidecar to exit on its own (it does after `destroy`),
    /// killing it after a grace period.
    pub async fn stop(&mut self) {
        info!("stopping sidecar process");
        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "sidecar process exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for sidecar process"),
            Err(_) => {
                warn!("sidecar process did not exit in time, killing");
                if let Err(e) = self.child.kill().await {
                    error!(error = %e, "failed to kill sidecar process");
                }
            }
        }
    }
}

/// Spawns the sidecar and forwards its output to `tracing`.
///
/// # Errors
///
/// Returns [`SidecarError`] if the script is missing, the process cannot be
/// spawned, or it exits within the startup grace period.
pub async fn start_sidecar(config: SidecarProcessConfig) -> Result<SidecarProcess, SidecarError> {
    let base = std::env::current_dir().map_err(SidecarError::WorkingDir)?;
    let script = anchor(&base, &config.script);
    if !tokio::fs::try_exists(&script).await.unwrap_or(false) {
        return Err(SidecarError::ScriptNotFound(script));
    }

    info!(
        script = %script.display(),
        port = config.port,
        "starting sidecar process"
    );

    let mut child = config.command(&base).spawn().map_err(SidecarError::Spawn)?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "relay_sidecar", "{line}");
            }
            debug!(target: "relay_sidecar", "stdout closed");
        });
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "relay_sidecar", "{line}");
            }
        });
    }

    tokio::time::sleep(STARTUP_GRACE).await;
    match child.try_wait() {
        Ok(Some(status)) => return Err(SidecarError::ExitedEarly(status)),
        Ok(None) => {}
        Err(e) => return Err(SidecarError::Status(e)),
    }

    info!(port = config.port, "sidecar process started");
    Ok(SidecarProcess { child })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(script: &str) -> SidecarProcessConfig {
        SidecarProcessConfig {
            script: PathBuf::from(script),
            node_binary: "node".into(),
            port: 8002,
            auth_dir: PathBuf::from("/tmp/relay-auth"),
            browser_executable: Some(PathBuf::from("/usr/bin/chromium")),
        }
    }

    #[tokio::test]
    async fn test_missing_script_is_reported_before_spawning() {
        let err = start_sidecar(config("/definitely/not/here/sidecar.js"))
            .await
            .err()
            .expect("missing script must fail");
        assert!(matches!(err, SidecarError::ScriptNotFound(_)));
    }

    fn envs(cmd: &Command) -> Vec<(String, String)> {
        cmd.as_std()
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_str()?.to_string(), v?.to_str()?.to_string())))
            .collect()
    }

    #[test]
    fn test_command_passes_settings_through_environment() {
        // Arrange
        let cfg = config("/opt/sidecar/index.js");

        // Act
        let cmd = cfg.command(Path::new("/srv/relay"));
        let std_cmd = cmd.as_std();
        let envs = envs(&cmd);

        // Assert
        assert_eq!(std_cmd.get_program(), "node");
        assert!(envs.contains(&("RELAY_SIDECAR_PORT".into(), "8002".into())));
        assert!(envs.contains(&("RELAY_AUTH_DIR".into(), "/tmp/relay-auth".into())));
        assert!(envs.contains(&("RELAY_BROWSER_EXECUTABLE".into(), "/usr/bin/chromium".into())));
        assert_eq!(
            std_cmd.get_current_dir(),
            Some(Path::new("/opt/sidecar"))
        );
    }

    #[test]
    fn test_relative_paths_resolve_against_relay_working_dir() {
        // Arrange: paths as typed on the command line
        let cfg = SidecarProcessConfig {
            script: PathBuf::from("sidecar/index.js"),
            auth_dir: PathBuf::from("./auth_wwebjs"),
            browser_executable: None,
            ..config("unused")
        };

        // Act
        let cmd = cfg.command(Path::new("/srv/relay"));
        let std_cmd = cmd.as_std();

        // Assert: node runs the script once, from its own directory, and the
        // credentials land where the relay purges them
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec![Path::new("/srv/relay/sidecar/index.js").as_os_str()]);
        assert_eq!(
            std_cmd.get_current_dir(),
            Some(Path::new("/srv/relay/sidecar"))
        );
        assert!(envs(&cmd).contains(&("RELAY_AUTH_DIR".into(), "/srv/relay/auth_wwebjs".into())));
    }

    #[test]
    fn test_anchor_keeps_absolute_paths() {
        assert_eq!(
            anchor(Path::new("/srv/relay"), Path::new("/var/lib/auth")),
            PathBuf::from("/var/lib/auth")
        );
        assert_eq!(
            anchor(Path::new("/srv/relay"), Path::new("auth")),
            PathBuf::from("/srv/relay/auth")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relative_script_starts_from_working_dir() {
        // Arrange: a script in a directory below the current one, run by `sh`
        let dir_name = format!("relay-sidecar-{}", uuid::Uuid::new_v4());
        let dir = std::env::current_dir().unwrap().join(&dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("run.sh"), "sleep 5\n").unwrap();
        let cfg = SidecarProcessConfig {
            script: PathBuf::from(&dir_name).join("run.sh"),
            node_binary: "sh".into(),
            browser_executable: None,
            ..config("unused")
        };

        // Act
        let started = start_sidecar(cfg).await;

        // Assert
        let outcome = match started {
            // Dropping the handle kills the child.
            Ok(process) => {
                drop(process);
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        };
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(outcome, Ok(()));
    }
}
