//! Streaming generation pipeline: fence classification, event emission and
//! the per-session generation task.

pub mod controller;
pub mod emitter;
pub mod events;
pub mod fence;

pub use controller::{Generator, StartGenerationError};
pub use emitter::DeltaEmitter;
pub use events::{Phase, ServerEvent};
pub use fence::{FenceMarker, FenceScan};
