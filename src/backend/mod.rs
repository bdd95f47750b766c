//! Text-generation backend seam.
//!
//! The generation controller consumes backends through [`TextStreamBackend`]
//! and depends only on the event shapes below; the concrete transport lives
//! in [`anthropic`].

pub mod anthropic;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use anthropic::{AnthropicBackend, AnthropicConfig};

/// Token accounting reported with the backend's final result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Dollar cost when the backend reports one; the raw Messages API only
    /// reports token counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// One request to the backend: a system instruction plus the user
/// instruction embedding the app description. Single turn, no tool use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
}

/// Events a backend stream may deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Incremental text fragment; appends to the transcript.
    TextDelta { text: String },
    /// Complete-so-far message text; replaces the transcript wholesale.
    /// Some delivery modes redeliver the full message on every update.
    MessageSnapshot { text: String },
    /// Structural notification with no artifact text (stream bookkeeping,
    /// keepalives, non-text deltas).
    Marker { kind: String },
    /// Final result. Always the last event of a successful stream.
    Completed { usage: Option<Usage> },
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("backend API key is not configured (set backend.api_key or ANTHROPIC_API_KEY)")]
    MissingApiKey,
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("backend protocol error: {0}")]
    Protocol(String),
    #[error("{0}")]
    Api(String),
}

pub type BackendStream = Pin<Box<dyn Stream<Item = Result<BackendEvent, BackendError>> + Send>>;

/// A streaming text-generation backend. One call is one turn.
#[async_trait]
pub trait TextStreamBackend: Send + Sync {
    /// Issue the request and return its event stream. Connection problems may
    /// surface either here or as the stream's first error item.
    async fn stream(&self, request: GenerationRequest) -> Result<BackendStream, BackendError>;
}
