pub mod client;
pub mod messages;

pub use client::{LiveConfig, LiveConnection, LiveConnector, WebSocketConnector};
pub use messages::{Blob, ClientMessage, RealtimeInput, ServerEvent, ServerMessage, Setup};
