//! Realtime transport: session abstraction, wire protocol, WebSocket backend.

pub mod protocol;
pub mod session;
pub mod websocket;

pub use protocol::{ClientMessage, ServerMessage};
pub use session::{
    MockTransport, MockTransportHandle, Transport, TransportEvent, TransportSession,
};
pub use websocket::WebSocketTransport;
