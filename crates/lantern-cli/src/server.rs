//! Observer server: a WebSocket progress channel plus HTTP polling
//! endpoints.
//!
//! Each WebSocket connection receives the events of the sessions it started
//! or subscribed to, in broadcaster order. Events travel through unbounded
//! queues end to end, so a slow observer delays only itself and never loses
//! an event.

use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use lantern_core::{
    params::{SessionId, StartRun},
    EngineError, RunManager,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

/// Observer → server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    StartRun(StartRun),
    StopRun(SessionId),
    Subscribe(SessionId),
}

/// Server → observer replies to client frames. Progress events are sent as
/// serialized `ProgressEvent`s alongside these.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerReply {
    RunStarted { session_id: String },
    StopRequested { session_id: String, active: bool },
    Subscribed { session_id: String },
    Error { message: String },
}

#[derive(Clone)]
struct AppState {
    runs: RunManager,
}

/// Error body for the HTTP endpoints.
struct ApiError(EngineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self(error)
    }
}

pub fn router(runs: RunManager) -> Router {
    Router::new()
        .route("/ws", get(observer_ws))
        .route("/health", get(health))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(show_session))
        .with_state(AppState { runs })
}

/// Serves until Ctrl-C.
pub async fn serve(bind: SocketAddr, runs: RunManager) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("Observer server listening on {bind}");

    axum::serve(listener, router(runs))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
            }
            info!("Shutting down observer server");
        })
        .await
        .context("Observer server failed")
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

async fn list_sessions(State(state): State<AppState>) -> Result<Response, ApiError> {
    let sessions = state.runs.engine().store().list_sessions().await?;
    Ok(Json(sessions).into_response())
}

async fn show_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = state.runs.engine().store().snapshot(&id).await?;
    let active = state.runs.is_active(&id);
    Ok(Json(json!({"active": active, "snapshot": snapshot})).into_response())
}

async fn observer_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.runs))
}

async fn handle_socket(socket: WebSocket, runs: RunManager) {
    let (mut sink, mut stream) = socket.split();
    let mut events = runs.engine().broadcaster().subscribe();
    let watched = Arc::new(Mutex::new(HashSet::<String>::new()));
    let (replies, mut reply_rx) = unbounded_channel::<String>();

    let filter = Arc::clone(&watched);
    let mut send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(event) = events.recv() => {
                    let wanted = filter
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .contains(event.event.session_id());
                    if !wanted {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to serialize event #{}: {e}", event.seq);
                            continue;
                        }
                    }
                }
                Some(reply) = reply_rx.recv() => reply,
                else => break,
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket receive error: {e}");
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(message) => handle_message(&runs, &watched, message).await,
            Err(e) => ServerReply::Error {
                message: format!("Unrecognized message: {e}"),
            },
        };
        if !send_reply(&replies, &reply) {
            break;
        }
    }

    drop(replies);
    if tokio::time::timeout(std::time::Duration::from_secs(1), &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
    debug!("Observer disconnected");
}

async fn handle_message(
    runs: &RunManager,
    watched: &Mutex<HashSet<String>>,
    message: ClientMessage,
) -> ServerReply {
    let watch = |session_id: &str| {
        watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string());
    };

    match message {
        ClientMessage::StartRun(mut params) => {
            // The run publishes as soon as it is spawned; watch its session
            // before starting it.
            let session_id = params
                .session
                .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
                .clone();
            watch(&session_id);
            match runs.start_run(params).await {
                Ok(session_id) => ServerReply::RunStarted { session_id },
                Err(e) => ServerReply::Error {
                    message: e.to_string(),
                },
            }
        }
        ClientMessage::StopRun(SessionId { session }) => {
            let active = runs.stop_run(&session);
            ServerReply::StopRequested {
                session_id: session,
                active,
            }
        }
        ClientMessage::Subscribe(SessionId { session }) => {
            watch(&session);
            ServerReply::Subscribed {
                session_id: session,
            }
        }
    }
}

fn send_reply(replies: &UnboundedSender<String>, reply: &ServerReply) -> bool {
    match serde_json::to_string(reply) {
        Ok(text) => replies.send(text).is_ok(),
        Err(e) => {
            warn!("Failed to serialize reply: {e}");
            true
        }
    }
}
