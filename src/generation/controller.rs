//! Drives one generation at a time per session: connects to the backend,
//! classifies streamed text and forwards events until a terminal outcome.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::backend::{BackendEvent, GenerationRequest, TextStreamBackend};
use crate::session::{SessionError, SessionRegistry};

use super::emitter::DeltaEmitter;
use super::events::{Phase, ServerEvent};
use super::fence::FenceMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartGenerationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("session not found")]
    SessionNotFound,
    #[error("a generation is already running for this session")]
    GenerationActive,
}

impl From<SessionError> for StartGenerationError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => Self::SessionNotFound,
            SessionError::GenerationActive => Self::GenerationActive,
        }
    }
}

/// Launches generation tasks. One instance is shared by all sessions; the
/// per-generation state lives in the spawned task.
pub struct Generator {
    backend: Arc<dyn TextStreamBackend>,
    registry: Arc<SessionRegistry>,
    marker: FenceMarker,
    system_prompt: String,
}

impl Generator {
    pub fn new(
        backend: Arc<dyn TextStreamBackend>,
        registry: Arc<SessionRegistry>,
        fence_language: &str,
    ) -> Self {
        Self {
            backend,
            registry,
            marker: FenceMarker::for_language(fence_language),
            system_prompt: system_prompt(fence_language),
        }
    }

    /// Validate the prompt, claim the session's generation slot and spawn the
    /// streaming task. Events arrive on `events` until a terminal event, after
    /// which the sender is dropped.
    ///
    /// Rejects a second start while a generation is running; callers cancel
    /// first if they want to replace it.
    pub fn start(
        &self,
        session_id: &str,
        prompt: &str,
        events: mpsc::Sender<ServerEvent>,
    ) -> Result<(), StartGenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StartGenerationError::EmptyPrompt);
        }
        let cancel_rx = self.registry.begin_generation(session_id)?;

        let request = GenerationRequest {
            system: self.system_prompt.clone(),
            prompt: prompt.to_string(),
        };
        let backend = Arc::clone(&self.backend);
        let registry = Arc::clone(&self.registry);
        let marker = self.marker.clone();
        let session_id = session_id.to_string();

        info!(session_id = %session_id, "starting generation");
        tokio::spawn(async move {
            run_generation(backend, request, marker, &events, cancel_rx).await;
            registry.end_generation(&session_id);
            debug!(session_id = %session_id, "generation task finished");
        });
        Ok(())
    }
}

fn system_prompt(language: &str) -> String {
    format!(
        "You are a rapid prototyper for single-file web apps. The user describes an \
         app; briefly explain what you will build, then emit the complete, \
         self-contained document in exactly one fenced code block opened with \
         ```{language} and closed with ```. Inline all styles and scripts and do not \
         reference external resources. Emit nothing after the closing fence."
    )
}

async fn run_generation(
    backend: Arc<dyn TextStreamBackend>,
    request: GenerationRequest,
    marker: FenceMarker,
    events: &mpsc::Sender<ServerEvent>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    if !send_event(
        events,
        ServerEvent::Status {
            phase: Phase::Connecting,
        },
    )
    .await
    {
        return;
    }

    let mut stream = match backend.stream(request).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "backend connection failed");
            send_event(
                events,
                ServerEvent::Error {
                    message: err.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let mut emitter = DeltaEmitter::new(marker);
    let mut streaming = false;

    loop {
        // Cancellation requested before this iteration wins over queued input.
        if *cancel_rx.borrow() {
            send_event(events, ServerEvent::Cancelled).await;
            return;
        }

        let item = tokio::select! {
            changed = cancel_rx.changed() => {
                // A closed channel means the session itself was dropped.
                let _ = changed;
                send_event(events, ServerEvent::Cancelled).await;
                return;
            }
            item = stream.next() => item,
        };

        let event = match item {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                warn!(error = %err, "backend stream failed");
                send_event(
                    events,
                    ServerEvent::Error {
                        message: err.to_string(),
                    },
                )
                .await;
                return;
            }
            None => {
                send_event(
                    events,
                    ServerEvent::Error {
                        message: "backend stream ended before the final result".to_string(),
                    },
                )
                .await;
                return;
            }
        };

        if !streaming {
            streaming = true;
            if !send_event(
                events,
                ServerEvent::Status {
                    phase: Phase::Generating,
                },
            )
            .await
            {
                return;
            }
        }

        match event {
            BackendEvent::TextDelta { text } => {
                for out in emitter.apply_delta(&text) {
                    if !send_event(events, out).await {
                        return;
                    }
                }
            }
            BackendEvent::MessageSnapshot { text } => {
                for out in emitter.apply_snapshot(&text) {
                    if !send_event(events, out).await {
                        return;
                    }
                }
            }
            BackendEvent::Marker { kind } => {
                debug!(kind = %kind, "backend marker");
            }
            BackendEvent::Completed { usage } => {
                info!(
                    code_bytes = emitter.code().len(),
                    input_tokens = usage.map(|u| u.input_tokens),
                    output_tokens = usage.map(|u| u.output_tokens),
                    "generation complete"
                );
                send_event(
                    events,
                    ServerEvent::Complete {
                        code: emitter.code().to_string(),
                        usage,
                    },
                )
                .await;
                return;
            }
        }
    }
}

/// Send one event, reporting whether anyone is still listening. A dropped
/// receiver aborts the generation loop.
async fn send_event(events: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> bool {
    events.send(event).await.is_ok()
}
