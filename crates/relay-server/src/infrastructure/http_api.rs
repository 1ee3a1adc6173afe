//! HTTP and realtime facade.
//!
//! | Method | Path                | Calls                          |
//! |--------|---------------------|--------------------------------|
//! | GET    | `/api/status`       | `SessionManager::status`       |
//! | GET    | `/api/qr`           | `SessionManager::challenge`    |
//! | POST   | `/api/send-message` | `SendPipeline::send_one`       |
//! | POST   | `/api/send-bulk`    | `SendPipeline::send_many`      |
//! | POST   | `/api/disconnect`   | `SessionManager::disconnect`   |
//! | GET    | `/ws`               | notification stream            |
//! | GET    | `/health`           | liveness check                 |
//!
//! Dashboards connect to `/ws` and receive `{"event": "qr"|"status",
//! "payload": ...}` text frames.  On connect they first get the current
//! status (and the pending QR code, if any), then live updates.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Sink, SinkExt, StreamExt};
use relay_core::{Notification, StatusLabel};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use crate::application::{SendPipeline, SessionManager};
use crate::domain::messages::{
    BulkSendRequest, BulkSendResponse, DisconnectResponse, ErrorBody, QrResponse,
    SendMessageRequest, SendMessageResponse, StatusResponse,
};
use crate::infrastructure::notify_hub::NotificationHub;

const SEND_MESSAGE_USAGE: &str = "Recipient and message are required";
const SEND_BULK_USAGE: &str = "A non-empty array of \"numbers\" and a \"message\" are required";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub session: Arc<SessionManager>,
    pub pipeline: Arc<SendPipeline>,
    pub hub: NotificationHub,
}

/// An error response: status code plus `{"error", "details"?}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, details: Option<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.to_string(),
                details,
            },
        }
    }

    fn bad_request(error: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, None)
    }

    fn internal(error: &str, details: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error, Some(details.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Builds the router with CORS restricted to `allowed_origins`.
pub fn build_router(state: ApiState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/qr", get(get_qr))
        .route("/api/send-message", post(send_message))
        .route("/api/send-bulk", post(send_bulk))
        .route("/api/disconnect", post(disconnect))
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.session.status().await,
    })
}

async fn get_qr(State(state): State<ApiState>) -> Result<Json<QrResponse>, ApiError> {
    match state.session.challenge().await {
        Ok(Some(qr)) => Ok(Json(QrResponse { qr })),
        Ok(None) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "No QR code available",
            None,
        )),
        Err(e) => Err(ApiError::internal("Failed to render QR code", e.to_string())),
    }
}

async fn send_message(
    State(state): State<ApiState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::bad_request(SEND_MESSAGE_USAGE))?;
    let (Some(recipient), Some(message)) = (request.recipient, request.message) else {
        return Err(ApiError::bad_request(SEND_MESSAGE_USAGE));
    };

    let result = state
        .pipeline
        .send_one(&recipient, &message)
        .await
        .map_err(|_| ApiError::bad_request(SEND_MESSAGE_USAGE))?;

    match result.message_id {
        Some(message_id) if result.success => Ok(Json(SendMessageResponse {
            success: true,
            message_id,
            recipient,
        })),
        _ => Err(ApiError::internal(
            "Failed to send message",
            result.error.unwrap_or_default(),
        )),
    }
}

async fn send_bulk(
    State(state): State<ApiState>,
    payload: Result<Json<BulkSendRequest>, JsonRejection>,
) -> Result<Json<BulkSendResponse>, ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::bad_request(SEND_BULK_USAGE))?;
    let recipients = request.recipients();
    let message = request.message.unwrap_or_default();

    let results = state
        .pipeline
        .send_many(&recipients, &message)
        .await
        .map_err(|_| ApiError::bad_request(SEND_BULK_USAGE))?;

    Ok(Json(BulkSendResponse { results }))
}

async fn disconnect(State(state): State<ApiState>) -> Result<Json<DisconnectResponse>, ApiError> {
    state
        .session
        .disconnect()
        .await
        .map_err(|e| ApiError::internal("Failed to disconnect", e.to_string()))?;
    Ok(Json(DisconnectResponse {
        success: true,
        message: "Disconnecting...".to_string(),
    }))
}

// ── Realtime notifications ────────────────────────────────────────────────────

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(move |socket| stream_notifications(socket, state))
}

async fn stream_notifications(socket: WebSocket, state: ApiState) {
    // Subscribe before taking the snapshot so nothing falls in between.
    let mut notifications = state.hub.subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!("dashboard connected");

    for notification in current_notifications(&state.session).await {
        if !deliver(&mut sender, &notification).await {
            return;
        }
    }

    loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Ok(notification) => {
                    if !deliver(&mut sender, &notification).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dashboard fell behind, notifications skipped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!("dashboard disconnected");
}

/// What a dashboard that connects right now should see first.
async fn current_notifications(session: &SessionManager) -> Vec<Notification> {
    let mut snapshot = Vec::with_capacity(2);
    match session.challenge().await {
        Ok(Some(qr)) => snapshot.push(Notification::Qr(qr)),
        Ok(None) => {}
        Err(e) => debug!(error = %e, "pending challenge not rendered for new dashboard"),
    }
    let state = session.tracked_state().await;
    snapshot.push(Notification::Status(StatusLabel::from(state)));
    snapshot
}

/// Sends one notification; returns `false` once the socket is gone.
async fn deliver<S>(sender: &mut S, notification: &Notification) -> bool
where
    S: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(notification) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to serialize notification");
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
