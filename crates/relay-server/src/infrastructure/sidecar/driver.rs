//! [`ChannelDriver`] implementation backed by the sidecar WebSocket.
//!
//! # Connection model
//!
//! ```text
//! SidecarDriver ── outbound mpsc ──► writer task ──► WebSocket ──► sidecar
//!      ▲                                                              │
//!      │ oneshot per request (pending map)                            │
//!      └──────────────── reader task ◄──────────── WebSocket ◄───────┘
//!                            │
//!                            └──► broadcast<DriverEvent> ──► SessionManager
//! ```
//!
//! The socket is opened by `initialize()` (and re-opened by a later
//! `initialize()` if it was lost).  The other calls use the current socket
//! and fail with [`DriverError::Unavailable`] when there is none.  When the
//! socket drops, every in-flight request fails with
//! [`DriverError::ConnectionClosed`].  If the socket had completed an
//! `initialize()`, a `Disconnected` event is also published so the session
//! manager schedules a reconnect.  A drop during `initialize()` is reported
//! only through that call's error, which drives the initialization backoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use relay_core::{ChannelAddress, DriverError, DriverEvent, SessionState};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{map_driver_state, message_id, SidecarCall, SidecarMessage, SidecarRequest};
use crate::application::ports::ChannelDriver;

/// Reason published when the sidecar socket drops.
pub const CONNECTION_LOST: &str = "sidecar connection lost";

const EVENT_CAPACITY: usize = 64;

/// Connection settings for [`SidecarDriver`].
#[derive(Debug, Clone)]
pub struct SidecarDriverConfig {
    /// `ws://host:port` of the sidecar.
    pub url: String,
    /// Upper bound on any single request.
    pub request_timeout: Duration,
}

type Reply = Result<Value, String>;
type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Reply>>>>;

/// One open WebSocket to the sidecar.
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Link {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }

    fn close(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Channel driver that delegates to the browser-automation sidecar.
pub struct SidecarDriver {
    config: SidecarDriverConfig,
    events: broadcast::Sender<DriverEvent>,
    link: Mutex<Option<Link>>,
    pending: PendingMap,
    /// Set once `initialize()` succeeded on the current socket.
    established: Arc<AtomicBool>,
}

impl SidecarDriver {
    pub fn new(config: SidecarDriverConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            events,
            link: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            established: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the outbound queue of a live socket, opening one if needed.
    async fn connect(&self) -> Result<mpsc::UnboundedSender<String>, DriverError> {
        let mut link = self.link.lock().await;
        if let Some(current) = link.as_ref() {
            if current.is_alive() {
                return Ok(current.outbound.clone());
            }
        }
        if let Some(stale) = link.take() {
            stale.close();
        }

        info!(url = %self.config.url, "connecting to sidecar");
        let (socket, _response) = tokio_tungstenite::connect_async(self.config.url.as_str())
            .await
            .map_err(|e| {
                DriverError::Unavailable(format!("cannot reach sidecar at {}: {e}", self.config.url))
            })?;
        let (sink, stream) = socket.split();

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let writer = tokio::spawn(write_frames(sink, outbound_rx));
        let reader = tokio::spawn(read_frames(
            stream,
            Arc::clone(&self.pending),
            self.events.clone(),
            Arc::clone(&alive),
            Arc::clone(&self.established),
        ));

        *link = Some(Link {
            outbound: outbound.clone(),
            alive,
            reader,
            writer,
        });
        info!("connected to sidecar");
        Ok(outbound)
    }

    /// Returns the outbound queue of the current socket without reconnecting.
    async fn current(&self) -> Result<mpsc::UnboundedSender<String>, DriverError> {
        match self.link.lock().await.as_ref() {
            Some(link) if link.is_alive() => Ok(link.outbound.clone()),
            _ => Err(DriverError::Unavailable("not connected to sidecar".into())),
        }
    }

    async fn request(
        &self,
        outbound: &mpsc::UnboundedSender<String>,
        call: SidecarCall,
    ) -> Result<Value, DriverError> {
        let request_id = Uuid::new_v4();
        let frame = serde_json::to_string(&SidecarRequest { request_id, call })
            .map_err(|e| DriverError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        if outbound.send(frame).is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(DriverError::ConnectionClosed);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(DriverError::Rejected(message)),
            Ok(Err(_)) => Err(DriverError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                warn!(%request_id, "sidecar request timed out");
                Err(DriverError::Timeout(self.config.request_timeout))
            }
        }
    }

    async fn call(&self, call: SidecarCall) -> Result<Value, DriverError> {
        let outbound = self.current().await?;
        self.request(&outbound, call).await
    }
}

#[async_trait]
impl ChannelDriver for SidecarDriver {
    async fn initialize(&self) -> Result<(), DriverError> {
        let outbound = self.connect().await?;
        self.established.store(false, Ordering::SeqCst);
        self.request(&outbound, SidecarCall::Initialize).await?;
        self.established.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn state(&self) -> Result<Option<SessionState>, DriverError> {
        let result = self.call(SidecarCall::GetState).await?;
        Ok(result.as_str().and_then(map_driver_state))
    }

    async fn is_registered(&self, address: &ChannelAddress) -> Result<bool, DriverError> {
        let result = self
            .call(SidecarCall::IsRegistered {
                chat_id: address.to_string(),
            })
            .await?;
        result
            .as_bool()
            .ok_or_else(|| DriverError::Protocol(format!("expected a boolean, got {result}")))
    }

    async fn send(&self, address: &ChannelAddress, text: &str) -> Result<String, DriverError> {
        let result = self
            .call(SidecarCall::Send {
                chat_id: address.to_string(),
                text: text.to_string(),
            })
            .await?;
        message_id(&result)
    }

    async fn logout(&self) -> Result<(), DriverError> {
        self.call(SidecarCall::Logout).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), DriverError> {
        let outbound = match self.current().await {
            Ok(outbound) => outbound,
            Err(_) => {
                debug!("no sidecar connection, nothing to destroy");
                return Ok(());
            }
        };
        self.established.store(false, Ordering::SeqCst);
        let outcome = self.request(&outbound, SidecarCall::Destroy).await;
        if let Some(link) = self.link.lock().await.take() {
            link.close();
        }
        outcome.map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.events.subscribe()
    }
}

// ── Socket tasks ──────────────────────────────────────────────────────────────

async fn write_frames<S>(mut sink: S, mut outbound: mpsc::UnboundedReceiver<String>)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(Message::Text(frame)).await {
            warn!(error = %e, "write to sidecar failed");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_frames<S>(
    mut stream: S,
    pending: PendingMap,
    events: broadcast::Sender<DriverEvent>,
    alive: Arc<AtomicBool>,
    established: Arc<AtomicBool>,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_frame(&text, &pending, &events).await,
            Ok(Message::Close(_)) => {
                debug!("sidecar closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "read from sidecar failed");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiting request with ConnectionClosed.
    let orphaned = pending.lock().await.drain().count();
    if orphaned > 0 {
        warn!(orphaned, "sidecar requests failed by lost connection");
    }
    if established.swap(false, Ordering::SeqCst) {
        let _ = events.send(DriverEvent::Disconnected(CONNECTION_LOST.to_string()));
    } else {
        debug!("sidecar connection lost before initialize completed");
    }
}

async fn handle_frame(text: &str, pending: &PendingMap, events: &broadcast::Sender<DriverEvent>) {
    let message = match serde_json::from_str::<SidecarMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "ignoring unparseable sidecar frame");
            return;
        }
    };

    if let SidecarMessage::Response {
        request_id,
        ok,
        result,
        error,
    } = message
    {
        let reply = if ok {
            Ok(result)
        } else {
            Err(error.unwrap_or_else(|| "sidecar request failed".to_string()))
        };
        match pending.lock().await.remove(&request_id) {
            Some(waiter) => {
                let _ = waiter.send(reply);
            }
            None => debug!(%request_id, "response for unknown or expired request"),
        }
        return;
    }

    if let SidecarMessage::Message { from, body } = &message {
        info!(%from, "incoming message");
        debug!(%from, %body, "incoming message body");
        return;
    }

    if let Some(event) = message.into_event() {
        match &event {
            DriverEvent::ChallengeIssued(_) => debug!("sidecar issued a challenge"),
            other => debug!(event = ?other, "sidecar event"),
        }
        let _ = events.send(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::SessionManager;
    use crate::infrastructure::mock::{MemoryCredentialStore, RecordingSink, StubChallengeEncoder};
    use relay_core::StatusLabel;
    use tokio::net::TcpListener;

    /// How a fake sidecar answers one request frame.
    type Responder = fn(&serde_json::Value) -> Option<serde_json::Value>;

    /// Starts a one-connection fake sidecar and returns its URL.
    ///
    /// Each request is answered by `responder`; `None` means "never answer".
    /// Frames in `push` are sent right after the first request arrives.
    async fn fake_sidecar(responder: Responder, push: Vec<serde_json::Value>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let (mut sink, mut stream) = ws.split();
            let mut push = Some(push);
            while let Some(Ok(Message::Text(text))) = stream.next().await {
                let request: serde_json::Value = serde_json::from_str(&text).unwrap();
                if let Some(frames) = push.take() {
                    for frame in frames {
                        sink.send(Message::Text(frame.to_string())).await.unwrap();
                    }
                }
                if request["type"] == "destroy" {
                    let reply = serde_json::json!({"type":"response","request_id":request["request_id"],"ok":true});
                    sink.send(Message::Text(reply.to_string())).await.unwrap();
                    break;
                }
                if let Some(mut reply) = responder(&request) {
                    reply["type"] = "response".into();
                    reply["request_id"] = request["request_id"].clone();
                    sink.send(Message::Text(reply.to_string())).await.unwrap();
                }
            }
        });

        format!("ws://{addr}")
    }

    fn driver(url: String, timeout: Duration) -> SidecarDriver {
        SidecarDriver::new(SidecarDriverConfig {
            url,
            request_timeout: timeout,
        })
    }

    fn happy(request: &serde_json::Value) -> Option<serde_json::Value> {
        let reply = match request["type"].as_str().unwrap() {
            "get_state" => serde_json::json!({"ok": true, "result": "CONNECTED"}),
            "is_registered" => serde_json::json!({"ok": true, "result": true}),
            "send" => serde_json::json!({"ok": true, "result": {"id": "3EB0C431"}}),
            "logout" => serde_json::json!({"ok": false, "error": "not logged in"}),
            _ => serde_json::json!({"ok": true}),
        };
        Some(reply)
    }

    #[tokio::test]
    async fn test_calls_before_initialize_are_unavailable() {
        let driver = driver("ws://127.0.0.1:1".into(), Duration::from_secs(1));
        assert!(matches!(driver.state().await, Err(DriverError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_initialize_fails_when_sidecar_unreachable() {
        // Port 1 is reserved and refuses connections.
        let driver = driver("ws://127.0.0.1:1".into(), Duration::from_secs(1));
        assert!(matches!(driver.initialize().await, Err(DriverError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_request_round_trip_through_sidecar() {
        // Arrange
        let url = fake_sidecar(happy, vec![]).await;
        let driver = driver(url, Duration::from_secs(5));
        driver.initialize().await.unwrap();
        let address = ChannelAddress::parse("15550001111").unwrap();

        // Act / Assert
        assert_eq!(driver.state().await.unwrap(), Some(SessionState::Connected));
        assert!(driver.is_registered(&address).await.unwrap());
        assert_eq!(driver.send(&address, "hi").await.unwrap(), "3EB0C431");
        assert_eq!(
            driver.logout().await,
            Err(DriverError::Rejected("not logged in".into()))
        );
        driver.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_pushed_events_reach_subscribers() {
        // Arrange
        let url = fake_sidecar(
            happy,
            vec![serde_json::json!({"type": "qr", "code": "2@abc"})],
        )
        .await;
        let driver = driver(url, Duration::from_secs(5));
        let mut events = driver.subscribe();

        // Act
        driver.initialize().await.unwrap();

        // Assert
        assert_eq!(
            events.recv().await.unwrap(),
            DriverEvent::ChallengeIssued("2@abc".into())
        );
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let url = fake_sidecar(|_| None, vec![]).await;
        let driver = driver(url, Duration::from_millis(100));

        let result = driver.initialize().await;

        assert_eq!(result, Err(DriverError::Timeout(Duration::from_millis(100))));
    }

    /// Accepts one connection and drops it after answering `answered`
    /// initialize requests and reading one more frame.
    async fn dropping_sidecar(answered: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for _ in 0..answered {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    let request: serde_json::Value = serde_json::from_str(&text).unwrap();
                    let reply = serde_json::json!({"type":"response","request_id":request["request_id"],"ok":true});
                    ws.send(Message::Text(reply.to_string())).await.unwrap();
                }
            }
            let _ = ws.next().await;
            drop(ws);
        });
        url
    }

    #[tokio::test]
    async fn test_drop_during_initialize_fails_the_call_without_disconnect_event() {
        // Arrange: the sidecar drops the socket as soon as it sees a request.
        let url = dropping_sidecar(0).await;
        let driver = driver(url, Duration::from_secs(5));
        let mut events = driver.subscribe();

        // Act
        let result = driver.initialize().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert
        assert_eq!(result, Err(DriverError::ConnectionClosed));
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert!(matches!(driver.state().await, Err(DriverError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_lost_connection_after_initialize_fails_pending_and_reports_disconnect() {
        // Arrange: initialize succeeds, the next request kills the socket.
        let url = dropping_sidecar(1).await;
        let driver = driver(url, Duration::from_secs(5));
        let mut events = driver.subscribe();
        driver.initialize().await.unwrap();

        // Act
        let result = driver.state().await;

        // Assert
        assert_eq!(result, Err(DriverError::ConnectionClosed));
        assert_eq!(
            events.recv().await.unwrap(),
            DriverEvent::Disconnected(CONNECTION_LOST.into())
        );
    }

    #[tokio::test]
    async fn test_failed_initialize_reports_a_single_error_status() {
        // Arrange
        let url = dropping_sidecar(0).await;
        let driver = Arc::new(driver(url, Duration::from_secs(5)));
        let sink = Arc::new(RecordingSink::new());

        // Act: the first retry is seconds away, so only one attempt is seen.
        let _manager = SessionManager::start(
            driver,
            Arc::new(MemoryCredentialStore::new(false)),
            sink.clone(),
            Arc::new(StubChallengeEncoder::default()),
        )
        .await;
        for _ in 0..100 {
            if !sink.statuses().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Assert: no reconnect status races the backoff
        assert_eq!(sink.statuses(), vec![StatusLabel::Error]);
    }

    #[tokio::test]
    async fn test_incoming_message_resolves_nothing_and_publishes_nothing() {
        // Arrange
        let (events, mut rx) = broadcast::channel(4);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (waiter, mut reply) = oneshot::channel();
        pending.lock().await.insert(Uuid::nil(), waiter);

        // Act
        handle_frame(
            r#"{"type":"message","from":"15550001111@c.us","body":"hi"}"#,
            &pending,
            &events,
        )
        .await;

        // Assert
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
        assert_eq!(pending.lock().await.len(), 1);
        assert!(reply.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_destroy_without_connection_is_a_no_op() {
        let driver = driver("ws://127.0.0.1:1".into(), Duration::from_secs(1));
        assert!(driver.destroy().await.is_ok());
    }
}
