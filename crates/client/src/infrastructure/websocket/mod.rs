//! STOMP-over-WebSocket transport.
//!
//! - `client`: the per-process connection and its bridge task
//! - `frame_builder`: every client frame the bridge sends
//! - `shared`: destinations, URL building and inbound frame classification

pub mod client;
pub mod frame_builder;
pub mod shared;

pub use client::{connect, ProcessConnection, TransportConfig, TransportError};
pub use frame_builder::StompFrameBuilder;
pub use shared::{connection_url, REGISTER_DESTINATION, USER_TOPIC};
