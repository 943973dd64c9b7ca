//! HTTP surface of the streaming gateway.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /ws/:version` | WebSocket upgrade into a streaming session |
//! | `GET /metrics` | Prometheus text exposition |
//! | `GET /health` | Liveness and session count |

use crate::domain::SessionContext;
use crate::error::StreamingError;
use crate::ports::{FrameSink, StreamFrame};
use crate::session::{wait_for_shutdown, SessionServices, StreamingSession};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use gateway_telemetry::encode_metrics;
use shared_types::{keys, AuthorizationContext, DittoHeaders, SignalException};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Subjects the upstream authentication layer vouched for.
pub const PRE_AUTHENTICATED_HEADER: &str = "x-ditto-pre-authenticated";

#[derive(Clone)]
pub struct StreamingState {
    pub services: SessionServices,
    pub shutdown: watch::Receiver<bool>,
}

pub fn create_router(state: StreamingState) -> Router {
    Router::new()
        .route("/ws/:version", get(upgrade_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until shutdown.
pub async fn serve(state: StreamingState) -> Result<(), StreamingError> {
    let addr = state.services.config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| StreamingError::Bind {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;
    serve_on(listener, state).await
}

pub async fn serve_on(listener: TcpListener, state: StreamingState) -> Result<(), StreamingError> {
    let addr = listener
        .local_addr()
        .map_err(|e| StreamingError::Server(e.to_string()))?;
    info!(addr = %addr, "Streaming gateway listening");

    let mut shutdown = state.shutdown.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown).await })
        .await
        .map_err(|e| StreamingError::Server(e.to_string()))?;

    info!("Streaming gateway stopped");
    Ok(())
}

async fn upgrade_handler(
    State(state): State<StreamingState>,
    Path(version): Path<String>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(authorization) = pre_authenticated(&headers) else {
        debug!("Rejected streaming upgrade without authenticated subjects");
        return exception_response(SignalException::unauthorized());
    };
    let Some(schema_version) = state.services.config.schema_version(&version) else {
        debug!(version = %version, "Rejected streaming upgrade for unsupported version");
        return exception_response(SignalException::command_not_supported(&version));
    };
    let Some(ws) = ws else {
        return (StatusCode::UPGRADE_REQUIRED, "Expected a WebSocket upgrade").into_response();
    };

    let context = SessionContext::new(Uuid::new_v4().to_string(), authorization, schema_version)
        .with_request_headers(&request_headers(&headers));
    let session = StreamingSession::new(context, state.services.clone());
    let shutdown = state.shutdown.clone();

    // Payload size is enforced by the session's frame assembler.
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        session
            .run(stream.map(frame_from_message), WebSocketSink(sink), shutdown)
            .await;
    })
}

async fn metrics_handler() -> Response {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(state): State<StreamingState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.services.hub.session_count(),
    }))
}

/// Comma separated subject ids; `None` if there are none.
fn pre_authenticated(headers: &HeaderMap) -> Option<AuthorizationContext> {
    let raw = headers.get(PRE_AUTHENTICATED_HEADER)?.to_str().ok()?;
    let context = AuthorizationContext::new(raw.split(',').map(str::trim));
    (!context.is_empty()).then_some(context)
}

fn request_headers(headers: &HeaderMap) -> DittoHeaders {
    keys::REQUEST_SUPPLIED
        .iter()
        .filter_map(|key| {
            let value = headers.get(*key)?.to_str().ok()?;
            Some((*key, value))
        })
        .collect()
}

fn exception_response(exception: SignalException) -> Response {
    let status = StatusCode::from_u16(exception.status).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(exception)).into_response()
}

fn frame_from_message(message: Result<Message, axum::Error>) -> StreamFrame {
    match message {
        Ok(Message::Text(text)) => StreamFrame::text(text),
        Ok(Message::Binary(data)) => StreamFrame::Binary(data.len()),
        Ok(Message::Ping(_)) => StreamFrame::Ping,
        Ok(Message::Pong(_)) => StreamFrame::Pong,
        Ok(Message::Close(_)) => StreamFrame::Close,
        Err(e) => {
            debug!(error = %e, "WebSocket receive failed");
            StreamFrame::Close
        }
    }
}

struct WebSocketSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), StreamingError> {
        self.0
            .send(Message::Text(text))
            .await
            .map_err(|e| StreamingError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}
