//! HTTP handlers: health probe and the SSE generation endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::generation::ServerEvent;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: Option<String>,
}

/// One-shot generation over SSE. The session lives only as long as the
/// response stream; disconnecting cancels the generation.
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let prompt = request.prompt.as_deref().unwrap_or_default().trim().to_string();
    if prompt.is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }

    let session_id = state.registry.create();
    let (events_tx, mut events_rx) = mpsc::channel::<ServerEvent>(EVENT_CHANNEL_CAPACITY);
    if let Err(err) = state.generator.start(&session_id, &prompt, events_tx) {
        state.registry.remove(&session_id);
        return Err(err.into());
    }

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    let registry = Arc::clone(&state.registry);
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(error = %err, "failed to serialize server event");
                    break;
                }
            };
            if tx.send(Ok(Event::default().data(payload))).await.is_err() {
                // Client went away.
                registry.cancel(&session_id);
                break;
            }
        }
        registry.remove(&session_id);
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}
