//! The session transition function.
//!
//! [`SessionMachine`] holds the three pieces of session bookkeeping that used
//! to be loose mutable globals: the current [`SessionState`], the pending
//! authentication challenge, and the initialization retry counter.  All
//! three change only inside [`SessionMachine::handle`].
//!
//! # Transition table
//!
//! | Event                 | New state                 | Actions                                              |
//! |-----------------------|---------------------------|------------------------------------------------------|
//! | `ChallengeIssued`     | `AwaitingAuthentication`  | publish challenge                                    |
//! | `Ready`               | `Connected`               | notify; retry counter reset                          |
//! | `AuthFailed`          | `AuthFailure`             | purge credentials; notify; re-initialize in 10 s     |
//! | `Disconnected`        | `Disconnected`            | purge if logout/banned; notify; re-initialize in 10 s |
//! | `DriverError`         | `Error`                   | notify                                               |
//! | `InitializeFailed`    | `Error`                   | notify; backoff retry, or purge + 30 min cooldown    |
//! | `InitializeSucceeded` | unchanged                 | retry counter reset                                  |
//! | `LoggedOut`           | `Disconnected`            | notify; purge credentials                            |

use std::time::Duration;

use tracing::debug;

use super::retry::RetryPolicy;
use super::state::{DisconnectReason, SessionState};
use crate::driver::DriverEvent;
use crate::notify::StatusLabel;

/// An input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The driver issued a fresh authentication challenge (raw QR token).
    ChallengeIssued(String),
    /// The session is authenticated and ready.
    Ready,
    /// The network rejected the credentials.
    AuthFailed(String),
    /// The session dropped.
    Disconnected(DisconnectReason),
    /// The driver reported a runtime error.
    DriverError(String),
    /// A call to `initialize()` failed.
    InitializeFailed(String),
    /// A call to `initialize()` completed.
    InitializeSucceeded,
    /// An explicit, caller-requested logout completed.
    LoggedOut,
}

impl From<DriverEvent> for SessionEvent {
    fn from(event: DriverEvent) -> Self {
        match event {
            DriverEvent::ChallengeIssued(token) => SessionEvent::ChallengeIssued(token),
            DriverEvent::Ready => SessionEvent::Ready,
            DriverEvent::AuthFailed(message) => SessionEvent::AuthFailed(message),
            DriverEvent::Disconnected(reason) => {
                SessionEvent::Disconnected(DisconnectReason::parse(&reason))
            }
            DriverEvent::Error(message) => SessionEvent::DriverError(message),
        }
    }
}

/// A side effect requested by the state machine.
///
/// Actions are returned in the order they must be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Encode the challenge token and broadcast it, followed by the
    /// `"QR Code Ready"` status.
    PublishChallenge(String),
    /// Broadcast a status label.
    Notify(StatusLabel),
    /// Delete the persisted credential blob (best effort).
    PurgeCredentials,
    /// Call `initialize()` again after the given delay.
    ScheduleInitialize(Duration),
}

/// Session bookkeeping plus the transition function.
#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    state: SessionState,
    challenge: Option<String>,
    retries: u32,
}

impl SessionMachine {
    /// Creates a machine in the `Disconnected` state with no challenge and a
    /// zero retry counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the locally tracked state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the pending challenge token, but only while the state is
    /// exactly [`SessionState::AwaitingAuthentication`].
    pub fn challenge(&self) -> Option<&str> {
        if self.state == SessionState::AwaitingAuthentication {
            self.challenge.as_deref()
        } else {
            None
        }
    }

    /// Returns the initialization retry counter.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Applies one event and returns the actions to execute.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        let previous = self.state;
        let actions = match event {
            SessionEvent::ChallengeIssued(token) => {
                self.state = SessionState::AwaitingAuthentication;
                self.challenge = Some(token.clone());
                vec![SessionAction::PublishChallenge(token)]
            }

            SessionEvent::Ready => {
                self.state = SessionState::Connected;
                self.challenge = None;
                self.retries = 0;
                vec![SessionAction::Notify(StatusLabel::Connected)]
            }

            SessionEvent::AuthFailed(_) => {
                self.state = SessionState::AuthFailure;
                vec![
                    SessionAction::PurgeCredentials,
                    SessionAction::Notify(StatusLabel::AuthenticationFailure),
                    SessionAction::ScheduleInitialize(RetryPolicy::RECONNECT_DELAY),
                ]
            }

            SessionEvent::Disconnected(reason) => {
                self.state = SessionState::Disconnected;
                self.challenge = None;
                let mut actions = Vec::with_capacity(3);
                if reason.invalidates_credentials() {
                    actions.push(SessionAction::PurgeCredentials);
                }
                actions.push(SessionAction::Notify(StatusLabel::Disconnected));
                actions.push(SessionAction::ScheduleInitialize(
                    RetryPolicy::RECONNECT_DELAY,
                ));
                actions
            }

            SessionEvent::DriverError(_) => {
                self.state = SessionState::Error;
                vec![SessionAction::Notify(StatusLabel::Error)]
            }

            SessionEvent::InitializeFailed(_) => {
                self.state = SessionState::Error;
                if self.retries < RetryPolicy::MAX_INIT_RETRIES {
                    self.retries += 1;
                    vec![
                        SessionAction::Notify(StatusLabel::Error),
                        SessionAction::ScheduleInitialize(RetryPolicy::init_retry_delay(
                            self.retries,
                        )),
                    ]
                } else {
                    // Budget exhausted: start over slowly rather than give up.
                    self.retries = 0;
                    vec![
                        SessionAction::Notify(StatusLabel::Error),
                        SessionAction::PurgeCredentials,
                        SessionAction::ScheduleInitialize(RetryPolicy::INIT_COOLDOWN),
                    ]
                }
            }

            SessionEvent::InitializeSucceeded => {
                self.retries = 0;
                Vec::new()
            }

            SessionEvent::LoggedOut => {
                self.state = SessionState::Disconnected;
                self.challenge = None;
                vec![
                    SessionAction::Notify(StatusLabel::Disconnected),
                    SessionAction::PurgeCredentials,
                ]
            }
        };

        debug!(from = %previous, to = %self.state, retries = self.retries, "session transition");
        actions
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
