//! STOMP frame builder for the process transport.
//!
//! Centralizes construction of every client frame so the bridge only decides
//! when to send, never what the frame looks like.

use arcana_protocol::{StompCommand, StompFrame};

use crate::infrastructure::messaging::ProcessKey;

use super::shared::{REGISTER_DESTINATION, SUBSCRIPTION_ID, USER_TOPIC};

/// Builder for client STOMP frames.
///
/// # Usage
///
/// ```rust,ignore
/// let frame = StompFrameBuilder::send("/app/register", &key, "{}".to_string());
/// ws.send(Message::Text(frame.encode())).await?;
/// ```
pub struct StompFrameBuilder;

impl StompFrameBuilder {
    // =========================================================================
    // Session
    // =========================================================================

    /// CONNECT for STOMP 1.2 with heart-beating disabled.
    pub fn connect(host: &str) -> StompFrame {
        StompFrame::new(StompCommand::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0")
    }

    pub fn disconnect() -> StompFrame {
        StompFrame::new(StompCommand::Disconnect)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// SUBSCRIBE to the user's private topic.
    pub fn subscribe_user_topic() -> StompFrame {
        StompFrame::new(StompCommand::Subscribe)
            .header("id", SUBSCRIPTION_ID)
            .header("destination", USER_TOPIC)
            .header("ack", "auto")
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// SEND a JSON body tagged with the process identifiers.
    pub fn send(destination: &str, key: &ProcessKey, body: String) -> StompFrame {
        StompFrame::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("userId", key.user_id.as_str())
            .header("processId", key.process_id.as_str())
            .with_body(body)
    }

    /// Registration frame that binds the session to the process.
    pub fn register(key: &ProcessKey) -> StompFrame {
        Self::send(REGISTER_DESTINATION, key, "{}".to_string())
    }
}
