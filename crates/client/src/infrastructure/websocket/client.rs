//! STOMP-over-WebSocket process connection using tokio-tungstenite.
//!
//! One bridge task per connection owns the socket. It performs the STOMP
//! handshake, subscribes to the user topic, registers the process and then
//! feeds every inbound event into the [`EventHandlerRegistry`]. Failures end
//! the connection; nothing is retried.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use arcana_protocol::StompFrame;

use crate::application::dispatcher::EventHandlerRegistry;
use crate::infrastructure::messaging::{
    set_connection_state, ConnectionHandle, ConnectionLease, ConnectionState,
    ConnectionStateObserver, LiveConnections, ProcessKey, SharedConnectionState,
};

use super::frame_builder::StompFrameBuilder;
use super::shared::{connection_url, parse_server_frame, InboundError, ParsedServerFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_CAPACITY: usize = 32;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("connection task has stopped")]
    ChannelClosed,
}

/// Where and how to open process connections.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket endpoint; process identifiers are appended as query parameters.
    pub ws_url: Url,
    /// Value of the STOMP `host` header.
    pub stomp_host: String,
}

impl TransportConfig {
    /// Config whose STOMP host is the host (and port) of `ws_url`.
    pub fn new(ws_url: Url) -> Self {
        let stomp_host = default_stomp_host(&ws_url);
        Self { ws_url, stomp_host }
    }
}

pub(crate) fn default_stomp_host(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => "localhost".to_string(),
    }
}

/// Open the connection for `key`.
///
/// Returns `None`, without opening anything, when either identifier is
/// empty or the pair already has a live connection in `live`. Must be
/// called from within a tokio runtime.
pub fn connect(
    config: &TransportConfig,
    key: ProcessKey,
    registry: Arc<EventHandlerRegistry>,
    live: &LiveConnections,
) -> Option<ProcessConnection> {
    if !key.is_complete() {
        tracing::warn!(
            user_id = %key.user_id,
            process_id = %key.process_id,
            "Missing user or process id, not connecting"
        );
        return None;
    }

    let Some(lease) = live.try_claim(&key) else {
        tracing::info!(
            user_id = %key.user_id,
            process_id = %key.process_id,
            "Process already has a live connection"
        );
        return None;
    };

    let state = SharedConnectionState::new(ConnectionState::Idle);
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (disconnect_tx, disconnect_rx) = oneshot::channel();

    let bridge = Bridge {
        url: connection_url(&config.ws_url, &key),
        stomp_host: config.stomp_host.clone(),
        key: key.clone(),
        registry,
        state: Arc::clone(&state),
        _lease: lease,
    };
    let task = tokio::spawn(bridge.run(outbound_rx, disconnect_rx));

    Some(ProcessConnection {
        key,
        handle: ConnectionHandle::new(state, disconnect_tx),
        outbound: outbound_tx,
        task: Some(task),
    })
}

/// A live connection for one process.
///
/// Dropping it requests a graceful disconnect; the pair is released from
/// [`LiveConnections`] once the bridge task has finished.
pub struct ProcessConnection {
    key: ProcessKey,
    handle: ConnectionHandle,
    outbound: mpsc::Sender<StompFrame>,
    task: Option<JoinHandle<()>>,
}

impl ProcessConnection {
    pub fn key(&self) -> &ProcessKey {
        &self.key
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        self.handle.observer()
    }

    /// See [`ConnectionStateObserver::wait_for_state`].
    pub async fn wait_for_state(&self, target: ConnectionState) -> ConnectionState {
        self.observer().wait_for_state(target).await
    }

    /// Publish `payload` as JSON to `destination`.
    ///
    /// Only possible while subscribed; otherwise the payload is dropped.
    /// Delivery is at most once.
    pub async fn send<T>(&self, destination: &str, payload: &T) -> Result<(), TransportError>
    where
        T: Serialize + ?Sized,
    {
        if !self.handle.is_subscribed() {
            tracing::warn!(
                destination = %destination,
                state = ?self.state(),
                "Not connected, dropping outbound message"
            );
            return Err(TransportError::NotConnected);
        }

        let body = serde_json::to_string(payload)?;
        let frame = StompFrameBuilder::send(destination, &self.key, body);
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Request a graceful disconnect. No-op when already requested.
    pub fn disconnect(&mut self) {
        if self.handle.disconnect() {
            tracing::debug!(
                user_id = %self.key.user_id,
                process_id = %self.key.process_id,
                "Disconnect requested"
            );
        }
    }

    /// Disconnect and wait for the bridge task to finish.
    pub async fn close(mut self) -> ConnectionState {
        self.disconnect();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Connection task failed");
            }
        }
        self.state()
    }
}

struct Bridge {
    url: Url,
    stomp_host: String,
    key: ProcessKey,
    registry: Arc<EventHandlerRegistry>,
    state: Arc<SharedConnectionState>,
    // Held for the lifetime of the task; dropping it releases the pair.
    _lease: ConnectionLease,
}

impl Bridge {
    async fn run(
        self,
        mut outbound: mpsc::Receiver<StompFrame>,
        mut disconnect: oneshot::Receiver<()>,
    ) {
        set_connection_state(&self.state, ConnectionState::Connecting);

        let ws = tokio::select! {
            result = self.open() => match result {
                Ok(ws) => ws,
                Err(e) => {
                    let reason = format!("{e:#}");
                    tracing::error!(
                        user_id = %self.key.user_id,
                        process_id = %self.key.process_id,
                        error = %reason,
                        "Failed to open process connection"
                    );
                    set_connection_state(&self.state, ConnectionState::Errored);
                    return;
                }
            },
            _ = &mut disconnect => {
                tracing::info!("Disconnect requested during handshake");
                set_connection_state(&self.state, ConnectionState::Disconnected);
                return;
            }
        };

        tracing::info!(
            user_id = %self.key.user_id,
            process_id = %self.key.process_id,
            "Subscribed to process events"
        );
        set_connection_state(&self.state, ConnectionState::Subscribed);

        let (mut write, mut read) = ws.split();
        let outcome = loop {
            tokio::select! {
                inbound = read.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(outcome) = self.handle_text(&text) {
                            break outcome;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("Server closed connection");
                        break ConnectionState::Disconnected;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket error");
                        break ConnectionState::Errored;
                    }
                },
                Some(frame) = outbound.recv() => {
                    if let Err(e) = write.send(Message::Text(frame.encode())).await {
                        tracing::error!(error = %e, "Failed to send frame");
                        break ConnectionState::Errored;
                    }
                }
                _ = &mut disconnect => {
                    let farewell = StompFrameBuilder::disconnect().encode();
                    if let Err(e) = write.send(Message::Text(farewell)).await {
                        tracing::debug!(error = %e, "DISCONNECT not delivered");
                    }
                    if let Err(e) = write.close().await {
                        tracing::debug!(error = %e, "WebSocket close failed");
                    }
                    tracing::info!(
                        user_id = %self.key.user_id,
                        process_id = %self.key.process_id,
                        "Disconnected"
                    );
                    break ConnectionState::Disconnected;
                }
            }
        };

        set_connection_state(&self.state, outcome);
    }

    /// Socket, CONNECT/CONNECTED, SUBSCRIBE, then the registration SEND.
    async fn open(&self) -> Result<WsStream> {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("WebSocket connect to {} failed", self.url))?;

        send_frame(&mut ws, StompFrameBuilder::connect(&self.stomp_host)).await?;
        loop {
            let Some(message) = ws.next().await else {
                bail!("connection closed during STOMP handshake");
            };
            let Message::Text(text) = message.context("WebSocket error during handshake")? else {
                continue;
            };
            match parse_server_frame(&text).context("invalid frame during handshake")? {
                ParsedServerFrame::Heartbeat => {}
                ParsedServerFrame::Connected { version } => {
                    tracing::debug!(version = ?version, "STOMP session established");
                    break;
                }
                ParsedServerFrame::Error { message } => bail!("STOMP error: {message}"),
                other => bail!("unexpected frame during handshake: {other:?}"),
            }
        }

        send_frame(&mut ws, StompFrameBuilder::subscribe_user_topic()).await?;
        send_frame(&mut ws, StompFrameBuilder::register(&self.key)).await?;
        Ok(ws)
    }

    /// Returns the final state when the frame ends the connection.
    fn handle_text(&self, text: &str) -> Option<ConnectionState> {
        match parse_server_frame(text) {
            Ok(ParsedServerFrame::Message(raw)) => {
                // Handlers are invoked here, in frame order; only their
                // completion runs on a separate task.
                let pending = self.registry.dispatch(raw);
                tokio::spawn(async move {
                    // Outcomes are logged by the registry.
                    let _ = pending.await;
                });
                None
            }
            Ok(ParsedServerFrame::Error { message }) => {
                tracing::error!(error = %message, "STOMP error frame");
                Some(ConnectionState::Errored)
            }
            Ok(ParsedServerFrame::Heartbeat) => None,
            Ok(other) => {
                tracing::debug!(frame = ?other, "Ignoring server frame");
                None
            }
            Err(InboundError::Body(e)) => {
                tracing::warn!(error = %e, "Dropping message with non-JSON body");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                None
            }
        }
    }
}

async fn send_frame(ws: &mut WsStream, frame: StompFrame) -> Result<()> {
    ws.send(Message::Text(frame.encode()))
        .await
        .with_context(|| format!("failed to send {} frame", frame.command))
}
