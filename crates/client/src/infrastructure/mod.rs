//! Infrastructure adapters: HTTP, live-connection tracking and the STOMP transport.

pub mod http_client;
pub mod messaging;
pub mod websocket;
