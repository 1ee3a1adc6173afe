//! In-memory collaborators for testing the application layer.
//!
//! # Why mocks?
//!
//! The real driver launches a browser through a sidecar process and needs a
//! phone to scan a QR code.  None of that is available in a test.  The types
//! here replace every collaborator with simple in-memory recording so test
//! assertions can inspect exactly what was called, in what order, and (with
//! a paused tokio clock) at what time.
//!
//! # Usage in tests
//!
//! ```ignore
//! let driver = Arc::new(MockDriver::new());
//! driver.set_state(Some(SessionState::Connected));
//! driver.register_all();
//!
//! let pipeline = SendPipeline::new(driver.clone());
//! pipeline.send_one("+1 555 000 1111", "hi").await?;
//!
//! assert_eq!(driver.send_calls().len(), 1);
//! ```
//!
//! Failures are scripted with the `fail_*` and `script_initialize` methods.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use relay_core::{ChannelAddress, DriverError, DriverEvent, Notification, SessionState, StatusLabel};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::application::ports::{
    ChallengeEncodeError, ChallengeEncoder, ChannelDriver, CredentialStore, NotificationSink,
};

// ── MockDriver ────────────────────────────────────────────────────────────────

/// One call made to [`MockDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Initialize,
    State,
    IsRegistered(String),
    Send { to: String, text: String },
    Logout,
    Destroy,
}

/// A [`DriverCall`] plus the (tokio) time it was made.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: DriverCall,
    pub at: Instant,
}

/// A scriptable channel driver that records every call.
///
/// Defaults: `initialize` succeeds, `state` reports `None`, nobody is
/// registered, every send succeeds with ids `msg-1`, `msg-2`, ...
pub struct MockDriver {
    events: broadcast::Sender<DriverEvent>,
    state: Mutex<Result<Option<SessionState>, DriverError>>,
    registered: Mutex<HashSet<String>>,
    all_registered: AtomicBool,
    initialize_script: Mutex<VecDeque<Result<(), DriverError>>>,
    send_failures: Mutex<HashMap<String, String>>,
    logout_error: Mutex<Option<DriverError>>,
    destroy_error: Mutex<Option<DriverError>>,
    calls: Mutex<Vec<RecordedCall>>,
    next_id: AtomicU64,
}

impl Default for MockDriver {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            state: Mutex::new(Ok(None)),
            registered: Mutex::new(HashSet::new()),
            all_registered: AtomicBool::new(false),
            initialize_script: Mutex::new(VecDeque::new()),
            send_failures: Mutex::new(HashMap::new()),
            logout_error: Mutex::new(None),
            destroy_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a lifecycle event to every subscriber.
    pub fn emit(&self, event: DriverEvent) {
        let _ = self.events.send(event);
    }

    /// Sets what `state()` reports.
    pub fn set_state(&self, state: Option<SessionState>) {
        *self.state.lock().unwrap() = Ok(state);
    }

    /// Makes `state()` fail.
    pub fn fail_state(&self, error: DriverError) {
        *self.state.lock().unwrap() = Err(error);
    }

    /// Marks one normalized address (`15550001111@c.us`) as registered.
    pub fn register(&self, address: &str) {
        self.registered.lock().unwrap().insert(address.to_string());
    }

    /// Treats every address as registered.
    pub fn register_all(&self) {
        self.all_registered.store(true, Ordering::SeqCst);
    }

    /// Queues outcomes for the next `initialize()` calls.  Once the queue is
    /// empty, `initialize()` succeeds.
    pub fn script_initialize(&self, outcomes: impl IntoIterator<Item = Result<(), DriverError>>) {
        self.initialize_script.lock().unwrap().extend(outcomes);
    }

    /// Makes every send to the normalized address fail with `message`.
    pub fn fail_send_to(&self, address: &str, message: &str) {
        self.send_failures
            .lock()
            .unwrap()
            .insert(address.to_string(), message.to_string());
    }

    pub fn fail_logout(&self, error: DriverError) {
        *self.logout_error.lock().unwrap() = Some(error);
    }

    pub fn fail_destroy(&self, error: DriverError) {
        *self.destroy_error.lock().unwrap() = Some(error);
    }

    /// Every call, in order, excluding `state()` queries.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.call != DriverCall::State)
            .cloned()
            .collect()
    }

    /// Counts calls (including `state()` queries) matching `predicate`.
    pub fn calls_matching(&self, predicate: impl Fn(&DriverCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| predicate(&c.call))
            .count()
    }

    /// Times at which `initialize()` was called.
    pub fn initialize_times(&self) -> Vec<Instant> {
        self.times_of(|c| *c == DriverCall::Initialize)
    }

    /// Every `send()` call, in order.
    pub fn send_calls(&self) -> Vec<DriverCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c.call, DriverCall::Send { .. }))
            .map(|c| c.call.clone())
            .collect()
    }

    /// Times at which `send()` was called.
    pub fn send_times(&self) -> Vec<Instant> {
        self.times_of(|c| matches!(c, DriverCall::Send { .. }))
    }

    fn times_of(&self, predicate: impl Fn(&DriverCall) -> bool) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| predicate(&c.call))
            .map(|c| c.at)
            .collect()
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().unwrap().push(RecordedCall {
            call,
            at: Instant::now(),
        });
    }
}

#[async_trait]
impl ChannelDriver for MockDriver {
    async fn initialize(&self) -> Result<(), DriverError> {
        self.record(DriverCall::Initialize);
        self.initialize_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn state(&self) -> Result<Option<SessionState>, DriverError> {
        self.record(DriverCall::State);
        self.state.lock().unwrap().clone()
    }

    async fn is_registered(&self, address: &ChannelAddress) -> Result<bool, DriverError> {
        self.record(DriverCall::IsRegistered(address.to_string()));
        Ok(self.all_registered.load(Ordering::SeqCst)
            || self.registered.lock().unwrap().contains(address.as_str()))
    }

    async fn send(&self, address: &ChannelAddress, text: &str) -> Result<String, DriverError> {
        self.record(DriverCall::Send {
            to: address.to_string(),
            text: text.to_string(),
        });
        if let Some(message) = self.send_failures.lock().unwrap().get(address.as_str()) {
            return Err(DriverError::Rejected(message.clone()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("msg-{id}"))
    }

    async fn logout(&self) -> Result<(), DriverError> {
        self.record(DriverCall::Logout);
        match self.logout_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn destroy(&self) -> Result<(), DriverError> {
        self.record(DriverCall::Destroy);
        match self.destroy_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }
}

// ── RecordingSink ─────────────────────────────────────────────────────────────

/// A notification sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    pub notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications, in emission order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Only the status labels, in emission order.
    pub fn statuses(&self) -> Vec<StatusLabel> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                Notification::Status(label) => Some(*label),
                Notification::Qr(_) => None,
            })
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

// ── MemoryCredentialStore ─────────────────────────────────────────────────────

/// A credential store that only tracks whether a blob "exists".
#[derive(Default)]
pub struct MemoryCredentialStore {
    present: AtomicBool,
    purges: AtomicUsize,
    /// When `true`, `purge()` fails with `PermissionDenied`.
    pub should_fail: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new(present: bool) -> Self {
        Self {
            present: AtomicBool::new(present),
            ..Self::default()
        }
    }

    /// Simulates the driver persisting a fresh credential blob.
    pub fn store(&self) {
        self.present.store(true, Ordering::SeqCst);
    }

    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    /// Number of `purge()` calls, successful or not.
    pub fn purge_count(&self) -> usize {
        self.purges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn purge(&self) -> io::Result<()> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.present.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ── StubChallengeEncoder ──────────────────────────────────────────────────────

/// Encodes a token as `data:text/plain,<token>` so tests can read it back.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubChallengeEncoder {
    fail: bool,
}

impl StubChallengeEncoder {
    /// An encoder that always fails.
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl ChallengeEncoder for StubChallengeEncoder {
    fn encode(&self, token: &str) -> Result<String, ChallengeEncodeError> {
        if self.fail {
            return Err(ChallengeEncodeError("stub encoder failure".into()));
        }
        Ok(format!("data:text/plain,{token}"))
    }
}
