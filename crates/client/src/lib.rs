//! Arcana client crate.
//!
//! Connects a divination process to the orchestration backend, validates the
//! events the backend pushes and routes them to caller-supplied handlers.

pub mod application;
pub mod config;
pub mod infrastructure;
pub mod ports;

pub use application::dispatcher::{
    DispatchOptions, EventHandlerRegistry, ProcessError, RegistryError,
};
pub use application::handlers::{
    event_handler, unknown_handler, EventHandler, EventHandlers, UnknownEventHandler,
};
pub use config::ClientConfig;
pub use infrastructure::messaging::{
    ConnectionState, ConnectionStateObserver, LiveConnections, ProcessKey,
};
pub use infrastructure::websocket::{ProcessConnection, TransportError};
