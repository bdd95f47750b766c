//! draftsmith: streams single-file web apps out of a text description.
//!
//! A prompt goes in over WebSocket or SSE; the model's reply is split on the
//! fly into prose commentary and the fenced document, and both are forwarded
//! to the client as they grow.

pub mod api;
pub mod backend;
pub mod config;
pub mod generation;
pub mod session;
pub mod ws;
