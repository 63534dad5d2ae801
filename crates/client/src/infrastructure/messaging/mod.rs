//! Connection lifecycle and live-connection tracking.
//!
//! - `ConnectionHandle` / `ConnectionStateObserver`: state of one transport connection
//! - `LiveConnections`: caller-owned registry enforcing one live connection per process

pub mod connection;
pub mod live;

pub use connection::{
    set_connection_state, ConnectionHandle, ConnectionState, ConnectionStateObserver,
    SharedConnectionState,
};
pub use live::{ConnectionLease, LiveConnections, ProcessKey};
