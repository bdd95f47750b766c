//! WebSocket session lifecycle: one session per connection, commands in,
//! server events out.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::types::ClientCommand;
use crate::api::AppState;
use crate::generation::ServerEvent;

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = state.registry.create();
    info!(
        session_id = %session_id,
        sessions = state.registry.len(),
        "websocket session started"
    );

    let (mut sink, mut inbound) = socket.split();
    let (events_tx, mut events_rx) = mpsc::channel::<ServerEvent>(EVENT_CHANNEL_CAPACITY);

    // Single writer: everything the client sees goes through this task.
    let send_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(error = %err, "failed to serialize server event");
                    continue;
                }
            };
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = inbound.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(session_id = %session_id, error = %err, "websocket read failed");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                dispatch_command(&state, &session_id, &text, &events_tx).await;
            }
            Message::Close(_) => break,
            // Ping/pong are answered by the library.
            _ => {}
        }
    }

    // Tears down any generation still streaming into this connection.
    state.registry.remove(&session_id);
    drop(events_tx);
    let _ = send_task.await;
    info!(
        session_id = %session_id,
        sessions = state.registry.len(),
        "websocket session closed"
    );
}

async fn dispatch_command(
    state: &AppState,
    session_id: &str,
    text: &str,
    events_tx: &mpsc::Sender<ServerEvent>,
) {
    match serde_json::from_str::<ClientCommand>(text) {
        Ok(ClientCommand::Generate { prompt }) => {
            if let Err(err) = state.generator.start(session_id, &prompt, events_tx.clone()) {
                warn!(session_id = %session_id, error = %err, "generate rejected");
                let _ = events_tx
                    .send(ServerEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
            }
        }
        Ok(ClientCommand::Cancel) => {
            if !state.registry.cancel(session_id) {
                debug!(session_id = %session_id, "cancel with no generation running");
            }
        }
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "malformed client command");
            let _ = events_tx
                .send(ServerEvent::Error {
                    message: format!("malformed command: {err}"),
                })
                .await;
        }
    }
}
