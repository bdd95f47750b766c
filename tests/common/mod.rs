use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use draftsmith::api::{AppState, create_router};
use draftsmith::backend::{
    BackendError, BackendEvent, BackendStream, GenerationRequest, TextStreamBackend, Usage,
};
use draftsmith::config::AppConfig;
use futures::stream;

/// Backend that replays a fixed script for every request.
pub struct ScriptedBackend {
    items: Vec<Result<BackendEvent, BackendError>>,
}

impl ScriptedBackend {
    pub fn new(items: Vec<Result<BackendEvent, BackendError>>) -> Self {
        Self { items }
    }

    /// Text deltas followed by a completion.
    pub fn completing(chunks: &[&str], usage: Option<Usage>) -> Self {
        let mut items: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                Ok(BackendEvent::TextDelta {
                    text: (*chunk).to_string(),
                })
            })
            .collect();
        items.push(Ok(BackendEvent::Completed { usage }));
        Self::new(items)
    }
}

#[async_trait]
impl TextStreamBackend for ScriptedBackend {
    async fn stream(&self, _request: GenerationRequest) -> Result<BackendStream, BackendError> {
        Ok(Box::pin(stream::iter(self.items.clone())))
    }
}

/// Backend that streams filler deltas forever and flags when its stream is
/// dropped, so tests can observe that a generation was torn down.
pub struct EndlessBackend {
    released: Arc<AtomicBool>,
}

impl EndlessBackend {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (
            Self {
                released: Arc::clone(&released),
            },
            released,
        )
    }
}

struct StreamGuard(Arc<AtomicBool>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextStreamBackend for EndlessBackend {
    async fn stream(&self, _request: GenerationRequest) -> Result<BackendStream, BackendError> {
        let guard = StreamGuard(Arc::clone(&self.released));
        Ok(Box::pin(stream::repeat_with(move || {
            let _held = &guard;
            Ok::<BackendEvent, BackendError>(BackendEvent::TextDelta {
                text: "x".to_string(),
            })
        })))
    }
}

pub fn test_app(backend: ScriptedBackend) -> axum::Router {
    create_router(AppState::new(AppConfig::default(), Arc::new(backend)))
}
