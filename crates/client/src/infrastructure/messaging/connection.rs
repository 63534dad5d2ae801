//! Connection lifecycle management.
//!
//! State of one transport connection, shared between the bridge task that
//! drives it and any number of observers.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Notify};

/// Connection state of one process connection.
///
/// `Idle → Connecting → Subscribed → Disconnected | Errored`. There is no
/// way back from the last two; a new connection has to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing opened yet (or refused to open)
    Idle,
    /// Socket and STOMP handshake in progress
    Connecting,
    /// Subscribed to the user topic and registered
    Subscribed,
    /// Closed on request or by the server
    Disconnected,
    /// Handshake or socket failure
    Errored,
}

impl ConnectionState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Subscribed => 2,
            ConnectionState::Disconnected => 3,
            ConnectionState::Errored => 4,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Subscribed,
            3 => ConnectionState::Disconnected,
            4 => ConnectionState::Errored,
            _ => ConnectionState::Idle,
        }
    }

    /// No further transitions happen from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Errored)
    }
}

/// Atomic state plus a wake-up for waiters.
#[derive(Debug)]
pub struct SharedConnectionState {
    value: AtomicU8,
    changed: Notify,
}

impl SharedConnectionState {
    pub fn new(initial: ConnectionState) -> Arc<Self> {
        Arc::new(Self {
            value: AtomicU8::new(initial.to_u8()),
            changed: Notify::new(),
        })
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.value.load(Ordering::SeqCst))
    }
}

/// Internal helper to update connection state (used by the bridge).
pub fn set_connection_state(state: &SharedConnectionState, new_state: ConnectionState) {
    let previous = ConnectionState::from_u8(state.value.swap(new_state.to_u8(), Ordering::SeqCst));
    if previous != new_state {
        tracing::debug!(from = ?previous, to = ?new_state, "Connection state changed");
    }
    state.changed.notify_waiters();
}

/// Handle to manage connection lifecycle.
///
/// Owned by the connection it belongs to. Disconnect is requested at most
/// once, either explicitly or when the handle is dropped.
#[derive(Debug)]
pub struct ConnectionHandle {
    state: Arc<SharedConnectionState>,
    disconnect_tx: Option<oneshot::Sender<()>>,
}

impl ConnectionHandle {
    /// Called by the bridge when spawning the connection task.
    pub fn new(state: Arc<SharedConnectionState>, disconnect_tx: oneshot::Sender<()>) -> Self {
        Self {
            state,
            disconnect_tx: Some(disconnect_tx),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_subscribed(&self) -> bool {
        self.state() == ConnectionState::Subscribed
    }

    /// Ask the bridge task to close the connection.
    ///
    /// Returns `false` if a disconnect was already requested or the bridge
    /// has already exited.
    pub fn disconnect(&mut self) -> bool {
        match self.disconnect_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        ConnectionStateObserver::new(Arc::clone(&self.state))
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Observable connection state for UI binding.
///
/// Multiple observers can share the same underlying state without owning
/// the connection.
#[derive(Debug, Clone)]
pub struct ConnectionStateObserver {
    state: Arc<SharedConnectionState>,
}

impl ConnectionStateObserver {
    pub fn new(state: Arc<SharedConnectionState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_subscribed(&self) -> bool {
        self.state() == ConnectionState::Subscribed
    }

    /// Wait until `predicate` holds for the current state.
    pub async fn wait_until<F>(&self, predicate: F) -> ConnectionState
    where
        F: Fn(ConnectionState) -> bool,
    {
        loop {
            let notified = self.state.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let current = self.state();
            if predicate(current) {
                return current;
            }
            notified.await;
        }
    }

    /// Wait for `target`, or for a terminal state if that comes first.
    ///
    /// Returns the state that ended the wait.
    pub async fn wait_for_state(&self, target: ConnectionState) -> ConnectionState {
        self.wait_until(|state| state == target || state.is_terminal())
            .await
    }
}
