//! SessionManager: keeps the single chat-network session alive.
//!
//! # How it works (for beginners)
//!
//! The channel driver pushes lifecycle events at us whenever it likes (a QR
//! challenge was issued, the session is ready, the phone logged out...).
//! Instead of reacting inside callbacks scattered around the code, every
//! event goes through **one** queue, consumed by **one** task: the event
//! loop.
//!
//! ```text
//! driver events ──┐
//!                 ├──► event loop ──► SessionMachine::handle ──► actions
//! commands ───────┘        │                                      │
//!  (Initialize, Apply,     │            notify sink ◄─────────────┤
//!   Schedule)              │            purge credentials ◄───────┤
//!                          └── retry timer (at most one) ◄────────┘
//! ```
//!
//! `initialize()` can take a long time (it launches a browser), and the
//! driver emits the QR challenge *while* it runs.  It is therefore executed
//! in its own task and reports its outcome back to the loop as a command.
//!
//! Retry timers never act directly either: when a timer fires it enqueues an
//! `Initialize` command.  A new schedule aborts the previous timer, and
//! [`SessionManager::shutdown`] cancels everything through a
//! [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use relay_core::{
    DriverEvent, Notification, SessionAction, SessionEvent, SessionMachine, SessionState,
    StatusLabel,
};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::RelayError;
use super::ports::{ChallengeEncoder, ChannelDriver, CredentialStore, NotificationSink};

/// Work items processed by the event loop besides driver events.
#[derive(Debug)]
enum Command {
    /// Call `initialize()` on the driver (in a separate task).
    Initialize,
    /// Feed an internally produced event to the state machine.
    Apply(SessionEvent),
    /// Replace the pending retry timer.
    Schedule(Duration),
}

/// Owner of the channel driver and of all session bookkeeping.
pub struct SessionManager {
    driver: Arc<dyn ChannelDriver>,
    credentials: Arc<dyn CredentialStore>,
    sink: Arc<dyn NotificationSink>,
    encoder: Arc<dyn ChallengeEncoder>,
    machine: Mutex<SessionMachine>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Starts supervising the driver.
    ///
    /// Stored credentials are deleted first, so every process starts from a
    /// fresh, unauthenticated session.  Then the driver's event stream is
    /// subscribed to (once), the event loop is spawned and the first
    /// `initialize()` is issued.
    pub async fn start(
        driver: Arc<dyn ChannelDriver>,
        credentials: Arc<dyn CredentialStore>,
        sink: Arc<dyn NotificationSink>,
        encoder: Arc<dyn ChallengeEncoder>,
    ) -> Arc<Self> {
        let (commands, inbox) = mpsc::unbounded_channel();
        let events = driver.subscribe();

        let manager = Arc::new(Self {
            driver,
            credentials,
            sink,
            encoder,
            machine: Mutex::new(SessionMachine::new()),
            commands,
            cancel: CancellationToken::new(),
            event_loop: Mutex::new(None),
        });

        info!("starting from a fresh session, removing stored credentials");
        manager.purge_credentials().await;

        let handle = tokio::spawn(Arc::clone(&manager).run(events, inbox));
        *manager.event_loop.lock().await = Some(handle);

        manager.enqueue(Command::Initialize);
        manager
    }

    // ── Public operations ─────────────────────────────────────────────────────

    /// Returns the live driver state, falling back to the tracked state when
    /// the driver cannot tell or cannot be reached.  Never fails.
    pub async fn status(&self) -> SessionState {
        match self.driver.state().await {
            Ok(Some(state)) => state,
            Ok(None) => self.tracked_state().await,
            Err(e) => {
                debug!(error = %e, "driver state unavailable, using tracked state");
                self.tracked_state().await
            }
        }
    }

    /// Returns the state as last recorded by the state machine.
    pub async fn tracked_state(&self) -> SessionState {
        self.machine.lock().await.state()
    }

    /// Returns the initialization retry counter.
    pub async fn retry_count(&self) -> u32 {
        self.machine.lock().await.retries()
    }

    /// Returns the pending challenge as an image data URL.
    ///
    /// `None` unless the session is exactly `awaiting_authentication`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Challenge`] if the token cannot be rendered.
    pub async fn challenge(&self) -> Result<Option<String>, RelayError> {
        let token = self.machine.lock().await.challenge().map(str::to_owned);
        match token {
            Some(token) => Ok(Some(self.encoder.encode(&token)?)),
            None => Ok(None),
        }
    }

    /// Logs out of the chat network.
    ///
    /// On success the session becomes `disconnected`, dashboards are told,
    /// and the credentials are deleted.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Driver`] if the driver refuses to log out; the
    /// session state is left untouched.
    pub async fn disconnect(&self) -> Result<(), RelayError> {
        info!("logging out of the chat network");
        if let Err(e) = self.driver.logout().await {
            error!(error = %e, "logout failed");
            return Err(e.into());
        }
        self.apply(SessionEvent::LoggedOut).await;
        Ok(())
    }

    /// Stops the event loop and any pending retry, then destroys the driver.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Driver`] if `destroy()` fails.
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        info!("shutting down session manager");
        self.cancel.cancel();

        let handle = self.event_loop.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "session event loop ended abnormally");
            }
        }

        self.driver.destroy().await?;
        info!("channel driver destroyed");
        Ok(())
    }

    // ── Event loop ────────────────────────────────────────────────────────────

    async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<DriverEvent>,
        mut inbox: mpsc::UnboundedReceiver<Command>,
    ) {
        let mut pending_retry: Option<JoinHandle<()>> = None;
        let mut events_open = true;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                received = events.recv(), if events_open => match received {
                    Ok(event) => self.apply(SessionEvent::from(event)).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session event loop fell behind driver events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("driver event stream closed");
                        events_open = false;
                    }
                },

                Some(command) = inbox.recv() => match command {
                    Command::Initialize => {
                        if self.tracked_state().await.is_connected() {
                            debug!("session already connected, skipping scheduled initialize");
                        } else {
                            self.spawn_initialize();
                        }
                    }
                    Command::Apply(event) => self.apply(event).await,
                    Command::Schedule(delay) => {
                        if let Some(previous) = pending_retry.take() {
                            previous.abort();
                        }
                        pending_retry = Some(self.spawn_retry_timer(delay));
                    }
                },
            }
        }

        if let Some(timer) = pending_retry.take() {
            timer.abort();
        }
        debug!("session event loop stopped");
    }

    async fn apply(&self, event: SessionEvent) {
        let actions = self.machine.lock().await.handle(event);
        for action in actions {
            self.execute(action).await;
        }
    }

    async fn execute(&self, action: SessionAction) {
        match action {
            SessionAction::PublishChallenge(token) => self.publish_challenge(&token),
            SessionAction::Notify(label) => {
                info!(status = label.as_str(), "session status changed");
                self.sink.emit(Notification::Status(label));
            }
            SessionAction::PurgeCredentials => self.purge_credentials().await,
            SessionAction::ScheduleInitialize(delay) => self.enqueue(Command::Schedule(delay)),
        }
    }

    fn publish_challenge(&self, token: &str) {
        match self.encoder.encode(token) {
            Ok(image) => {
                info!(token_len = token.len(), "authentication challenge issued, scan the QR code");
                if tracing::enabled!(tracing::Level::DEBUG) {
                    if let Some(text) = self.encoder.terminal(token) {
                        debug!("\n{text}");
                    }
                }
                self.sink.emit(Notification::Qr(image));
                self.sink.emit(Notification::Status(StatusLabel::QrCodeReady));
            }
            Err(e) => {
                error!(error = %e, "could not render authentication challenge");
                self.sink.emit(Notification::Status(StatusLabel::Error));
            }
        }
    }

    async fn purge_credentials(&self) {
        match self.credentials.purge().await {
            Ok(()) => debug!("stored credentials removed"),
            Err(e) => warn!(error = %e, "failed to remove stored credentials"),
        }
    }

    fn spawn_initialize(&self) {
        let driver = Arc::clone(&self.driver);
        let commands = self.commands.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            info!("initializing channel driver");
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = driver.initialize() => outcome,
            };
            let event = match outcome {
                Ok(()) => {
                    info!("channel driver initialized");
                    SessionEvent::InitializeSucceeded
                }
                Err(e) => {
                    error!(error = %e, "failed to initialize channel driver");
                    SessionEvent::InitializeFailed(e.to_string())
                }
            };
            // The loop may already be gone during shutdown.
            let _ = commands.send(Command::Apply(event));
        });
    }

    fn spawn_retry_timer(&self, delay: Duration) -> JoinHandle<()> {
        let commands = self.commands.clone();
        let cancel = self.cancel.clone();
        info!(delay_secs = delay.as_secs(), "re-initialize scheduled");

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = commands.send(Command::Initialize);
                }
            }
        })
    }

    fn enqueue(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("session event loop is gone, command dropped");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{
        DriverCall, MemoryCredentialStore, MockDriver, RecordingSink, StubChallengeEncoder,
    };
    use relay_core::DriverError;

    struct Harness {
        driver: Arc<MockDriver>,
        sink: Arc<RecordingSink>,
        credentials: Arc<MemoryCredentialStore>,
        manager: Arc<SessionManager>,
    }

    async fn start_with(driver: MockDriver, encoder: StubChallengeEncoder) -> Harness {
        let driver = Arc::new(driver);
        let sink = Arc::new(RecordingSink::new());
        let credentials = Arc::new(MemoryCredentialStore::new(true));
        let manager = SessionManager::start(
            driver.clone(),
            credentials.clone(),
            sink.clone(),
            Arc::new(encoder),
        )
        .await;
        settle().await;
        Harness {
            driver,
            sink,
            credentials,
            manager,
        }
    }

    async fn start() -> Harness {
        start_with(MockDriver::new(), StubChallengeEncoder::default()).await
    }

    /// Lets every spawned task run until it blocks.  With a paused clock the
    /// runtime only advances time once nothing else is runnable.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_purges_credentials_and_initializes_once() {
        // Arrange / Act
        let h = start().await;

        // Assert
        assert!(!h.credentials.is_present());
        assert_eq!(h.credentials.purge_count(), 1);
        assert_eq!(h.driver.initialize_times().len(), 1);
        assert_eq!(h.manager.tracked_state().await, SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_challenge_is_published_then_cleared_on_ready() {
        // Arrange
        let h = start().await;

        // Act: challenge issued
        h.driver.emit(DriverEvent::ChallengeIssued("2@abc".into()));
        settle().await;

        // Assert: qr then "QR Code Ready"
        assert_eq!(
            h.sink.notifications(),
            vec![
                Notification::Qr("data:text/plain,2@abc".into()),
                Notification::Status(StatusLabel::QrCodeReady),
            ]
        );
        assert_eq!(
            h.manager.challenge().await.unwrap(),
            Some("data:text/plain,2@abc".to_string())
        );

        // Act: ready
        h.driver.emit(DriverEvent::Ready);
        settle().await;

        // Assert: challenge gone even though the token is still cached
        assert_eq!(h.manager.challenge().await.unwrap(), None);
        assert_eq!(h.sink.statuses().last(), Some(&StatusLabel::Connected));
        assert_eq!(h.manager.tracked_state().await, SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_purges_and_reinitializes_once_after_ten_seconds() {
        // Arrange
        let h = start().await;
        h.credentials.store();

        // Act
        h.driver.emit(DriverEvent::AuthFailed("bad session".into()));
        settle().await;

        // Assert: purged and notified immediately
        assert!(!h.credentials.is_present());
        assert_eq!(
            h.sink.statuses(),
            vec![StatusLabel::AuthenticationFailure]
        );

        // Nothing before the 10 s mark...
        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert_eq!(h.driver.initialize_times().len(), 1);

        // ...exactly one re-initialize after it, and no more later.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.driver.initialize_times().len(), 2);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.driver.initialize_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_disconnect_purges_credentials() {
        let h = start().await;
        h.credentials.store();

        h.driver.emit(DriverEvent::Disconnected("LOGOUT".into()));
        settle().await;

        assert!(!h.credentials.is_present());
        assert_eq!(h.sink.statuses(), vec![StatusLabel::Disconnected]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_disconnect_keeps_credentials_and_reconnects() {
        // Arrange
        let h = start().await;
        h.credentials.store();

        // Act
        h.driver.emit(DriverEvent::Disconnected("NAVIGATION".into()));
        tokio::time::sleep(Duration::from_secs(11)).await;

        // Assert
        assert!(h.credentials.is_present());
        assert_eq!(h.driver.initialize_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_error_notifies_without_purging_or_retrying() {
        let h = start().await;
        h.credentials.store();

        h.driver.emit(DriverEvent::Error("page crashed".into()));
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(h.credentials.is_present());
        assert_eq!(h.sink.statuses(), vec![StatusLabel::Error]);
        assert_eq!(h.driver.initialize_times().len(), 1);
        assert_eq!(h.manager.tracked_state().await, SessionState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_initialize_failure_uses_cooldown_and_resets_counter() {
        // Arrange: every initialize fails
        let driver = MockDriver::new();
        driver.script_initialize(
            (0..5).map(|_| Err(DriverError::Unavailable("browser missing".into()))),
        );

        // Act: initial attempt + retries after 20 s, 40 s and 60 s
        let h = start_with(driver, StubChallengeEncoder::default()).await;
        tokio::time::sleep(Duration::from_secs(20 + 40 + 60 + 1)).await;

        // Assert: four attempts so far, counter reset, credentials purged again
        assert_eq!(h.driver.initialize_times().len(), 4);
        assert_eq!(h.manager.retry_count().await, 0);
        assert_eq!(h.credentials.purge_count(), 2);

        // The next attempt only happens after the 30 minute cooldown.
        tokio::time::sleep(Duration::from_secs(29 * 60)).await;
        assert_eq!(h.driver.initialize_times().len(), 4);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.driver.initialize_times().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_prefers_live_driver_state() {
        let h = start().await;
        h.driver.set_state(Some(SessionState::Connected));

        assert_eq!(h.manager.status().await, SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_falls_back_to_tracked_state_when_driver_fails() {
        // Arrange
        let h = start().await;
        h.driver.emit(DriverEvent::ChallengeIssued("token".into()));
        settle().await;
        h.driver
            .fail_state(DriverError::Unavailable("sidecar down".into()));

        // Act
        let status = h.manager.status().await;

        // Assert
        assert_eq!(status, SessionState::AwaitingAuthentication);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_logs_out_notifies_and_purges() {
        // Arrange
        let h = start().await;
        h.driver.emit(DriverEvent::Ready);
        settle().await;
        h.credentials.store();

        // Act
        h.manager.disconnect().await.unwrap();

        // Assert
        assert!(h.driver.calls().iter().any(|c| c.call == DriverCall::Logout));
        assert_eq!(h.manager.tracked_state().await, SessionState::Disconnected);
        assert_eq!(h.sink.statuses().last(), Some(&StatusLabel::Disconnected));
        assert!(!h.credentials.is_present());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_logout_propagates_and_keeps_state() {
        // Arrange
        let h = start().await;
        h.driver.emit(DriverEvent::Ready);
        settle().await;
        h.driver.fail_logout(DriverError::Rejected("not logged in".into()));

        // Act
        let result = h.manager.disconnect().await;

        // Assert
        assert!(matches!(result, Err(RelayError::Driver(_))));
        assert_eq!(h.manager.tracked_state().await, SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unencodable_challenge_emits_error_status() {
        let h = start_with(MockDriver::new(), StubChallengeEncoder::failing()).await;

        h.driver.emit(DriverEvent::ChallengeIssued("token".into()));
        settle().await;

        assert_eq!(h.sink.notifications(), vec![Notification::Status(StatusLabel::Error)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_initialize_is_skipped_once_connected() {
        // Arrange: a transient drop schedules a reconnect...
        let h = start().await;
        h.driver.emit(DriverEvent::Disconnected("NAVIGATION".into()));
        settle().await;

        // ...but the driver recovers on its own first.
        h.driver.emit(DriverEvent::Ready);
        tokio::time::sleep(Duration::from_secs(15)).await;

        // Assert
        assert_eq!(h.driver.initialize_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_retry_and_destroys_driver() {
        // Arrange: a re-initialize is pending
        let h = start().await;
        h.driver.emit(DriverEvent::AuthFailed("bad".into()));
        settle().await;

        // Act
        h.manager.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        // Assert
        assert_eq!(h.driver.initialize_times().len(), 1);
        assert!(h.driver.calls().iter().any(|c| c.call == DriverCall::Destroy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_propagates_destroy_failure() {
        let h = start().await;
        h.driver.fail_destroy(DriverError::ConnectionClosed);

        let result = h.manager.shutdown().await;

        assert!(matches!(result, Err(RelayError::Driver(DriverError::ConnectionClosed))));
    }
}
