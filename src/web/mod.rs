//! Observer channel (WebSocket) and HTTP status endpoint.

pub mod api;
pub mod observer;
pub mod session_channel;
