//! Events streamed to clients.
//!
//! The same tagged shapes travel over both transports: WebSocket frames and
//! SSE `data:` lines.

use serde::{Deserialize, Serialize};

use crate::backend::Usage;

/// Lifecycle phase reported through status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The backend request is being set up.
    Connecting,
    /// The first backend event has arrived; output is streaming.
    Generating,
}

/// One event in the client-facing stream, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Lifecycle phase update.
    Status { phase: Phase },
    /// The code region has started. Sent exactly once per generation, always
    /// before the first `Code` event.
    CodeStart,
    /// Cumulative code payload — the full artifact so far, not a diff.
    Code { content: String },
    /// Cumulative explanatory prose preceding the code region.
    Analysis { text: String },
    /// Terminal: generation finished; carries the final artifact and any
    /// usage metadata the backend reported.
    Complete {
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Terminal: generation stopped on client request.
    Cancelled,
    /// Terminal for the generation it reports on, or the reply to a rejected
    /// or malformed command; the transport channel stays open either way.
    Error { message: String },
}
