// Adapters layer: concrete implementations for external systems (REST, Socket.IO transport).

pub mod http;
pub mod socketio;
pub mod websocket;
