//! Shared helpers for the STOMP transport: destinations, URL building and
//! inbound frame classification.

use serde_json::Value;
use thiserror::Error;
use url::Url;

use arcana_protocol::{FrameError, StompCommand, StompFrame};

use crate::infrastructure::messaging::ProcessKey;

/// Private per-user topic the backend pushes events to.
pub const USER_TOPIC: &str = "/user/topic/messages";
/// Destination of the registration frame.
pub const REGISTER_DESTINATION: &str = "/app/register";
/// Subscription id used for the user topic (one subscription per connection).
pub const SUBSCRIPTION_ID: &str = "sub-0";

/// WebSocket URL for one process: `<base>?userId=..&processId=..`.
pub fn connection_url(base: &Url, key: &ProcessKey) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("userId", &key.user_id)
        .append_pair("processId", &key.process_id);
    url
}

/// Server frame with the parts the bridge acts on lifted out.
#[derive(Debug, PartialEq)]
pub enum ParsedServerFrame {
    Heartbeat,
    Connected { version: Option<String> },
    Message(Value),
    Error { message: String },
    Other(StompCommand),
}

#[derive(Debug, Error)]
pub enum InboundError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("message body is not JSON: {0}")]
    Body(#[from] serde_json::Error),
}

pub fn parse_server_frame(text: &str) -> Result<ParsedServerFrame, InboundError> {
    let Some(frame) = StompFrame::decode(text)? else {
        return Ok(ParsedServerFrame::Heartbeat);
    };
    Ok(match frame.command {
        StompCommand::Connected => ParsedServerFrame::Connected {
            version: frame.get("version").map(str::to_string),
        },
        StompCommand::Message => ParsedServerFrame::Message(serde_json::from_str(&frame.body)?),
        StompCommand::Error => {
            let message = match frame.get("message") {
                Some(message) => message.to_string(),
                None => frame.body.clone(),
            };
            ParsedServerFrame::Error { message }
        }
        other => ParsedServerFrame::Other(other),
    })
}
