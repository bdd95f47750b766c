//! WebSocket endpoint.

pub mod handler;
pub mod types;

pub use handler::websocket;
pub use types::ClientCommand;
