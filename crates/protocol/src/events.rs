//! Backend-pushed event types
//!
//! Every event carries a nested discriminant at `type.type`. The tag selects
//! exactly one concrete payload shape; the payload fields sit next to `type`
//! at the top level of the JSON object:
//!
//! ```json
//! {"type":{"type":"payment.completed"},"state":"PAYMENT_SUCCEEDED","message":"ok"}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// Enumerations (mirror the backend enums, exact string round trip)
// =============================================================================

/// Lifecycle status reported by `process.ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    Started,
    Pending,
    PaymentAccepted,
    #[serde(rename = "FailedIntegrationWithChatGPT")]
    FailedIntegrationWithChatGpt,
    FinishedWithWrongPaymentStatus,
    Finished,
}

/// Outcome of the reading generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    Success,
    Failure,
}

/// Payment state reported by `payment.completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Pending,
    PaymentSucceeded,
    PaymentFailedTechnicalError,
    PaymentFailedBusinessError,
}

// =============================================================================
// Event Tags
// =============================================================================

/// Discriminant of a [`FrontendEvent`], i.e. the value found at `type.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventTag {
    #[serde(rename = "divination.requested")]
    DivinationRequested,
    #[serde(rename = "process.started")]
    ProcessStarted,
    #[serde(rename = "process.ended")]
    ProcessEnded,
    #[serde(rename = "divination.generation")]
    DivinationGeneration,
    #[serde(rename = "payment.blik.incorrect")]
    IncorrectBlikCode,
    #[serde(rename = "payment.completed")]
    PaymentCompleted,
    #[serde(rename = "error.business")]
    BusinessError,
    #[serde(rename = "error.technical")]
    TechnicalError,
}

impl EventTag {
    /// Every tag the client understands.
    pub const ALL: [EventTag; 8] = [
        EventTag::DivinationRequested,
        EventTag::ProcessStarted,
        EventTag::ProcessEnded,
        EventTag::DivinationGeneration,
        EventTag::IncorrectBlikCode,
        EventTag::PaymentCompleted,
        EventTag::BusinessError,
        EventTag::TechnicalError,
    ];

    /// Wire representation of the tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventTag::DivinationRequested => "divination.requested",
            EventTag::ProcessStarted => "process.started",
            EventTag::ProcessEnded => "process.ended",
            EventTag::DivinationGeneration => "divination.generation",
            EventTag::IncorrectBlikCode => "payment.blik.incorrect",
            EventTag::PaymentCompleted => "payment.completed",
            EventTag::BusinessError => "error.business",
            EventTag::TechnicalError => "error.technical",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string that is not one of the known [`EventTag`]s.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported event type: {0}")]
pub struct UnknownEventTag(pub String);

impl FromStr for EventTag {
    type Err = UnknownEventTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| UnknownEventTag(s.to_string()))
    }
}

// =============================================================================
// Event Payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TarotCard {
    pub card_name: String,
    pub description: String,
    pub is_reversed: bool,
}

/// `divination.requested` - the cards drawn for this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivinationRequestedEvent {
    pub cards: Vec<TarotCard>,
}

/// `process.started`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStartedEvent {
    pub process_id: String,
}

/// `process.ended`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEndedEvent {
    pub status: ProcessStatus,
    pub message: String,
}

/// `divination.generation` - the generated reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivinationGenerationEvent {
    pub divination: String,
    pub status: GenerationStatus,
}

/// `payment.blik.incorrect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncorrectBlikCodeEvent {
    pub message: String,
}

/// `payment.completed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompletedEvent {
    pub state: PaymentState,
    pub message: String,
}

/// Payload of `error.business` and `error.technical`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message: String,
}

// =============================================================================
// Frontend Event (discriminated union)
// =============================================================================

/// Every event the backend can push to the client.
///
/// Serialization writes the nested `{"type":{"type":<tag>}}` discriminant next
/// to the payload fields. Deserialization goes through
/// [`parse_event`](crate::validation::parse_event), so it is exactly as strict
/// as the runtime validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendEvent {
    DivinationRequested(DivinationRequestedEvent),
    ProcessStarted(ProcessStartedEvent),
    ProcessEnded(ProcessEndedEvent),
    DivinationGeneration(DivinationGenerationEvent),
    IncorrectBlikCode(IncorrectBlikCodeEvent),
    PaymentCompleted(PaymentCompletedEvent),
    BusinessError(MessageEvent),
    TechnicalError(MessageEvent),
}

impl FrontendEvent {
    pub fn tag(&self) -> EventTag {
        match self {
            FrontendEvent::DivinationRequested(_) => EventTag::DivinationRequested,
            FrontendEvent::ProcessStarted(_) => EventTag::ProcessStarted,
            FrontendEvent::ProcessEnded(_) => EventTag::ProcessEnded,
            FrontendEvent::DivinationGeneration(_) => EventTag::DivinationGeneration,
            FrontendEvent::IncorrectBlikCode(_) => EventTag::IncorrectBlikCode,
            FrontendEvent::PaymentCompleted(_) => EventTag::PaymentCompleted,
            FrontendEvent::BusinessError(_) => EventTag::BusinessError,
            FrontendEvent::TechnicalError(_) => EventTag::TechnicalError,
        }
    }
}

#[derive(Serialize)]
struct Discriminant {
    #[serde(rename = "type")]
    tag: EventTag,
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "type")]
    discriminant: Discriminant,
    #[serde(flatten)]
    body: &'a T,
}

fn tagged<T>(tag: EventTag, body: &T) -> Tagged<'_, T> {
    Tagged {
        discriminant: Discriminant { tag },
        body,
    }
}

impl Serialize for FrontendEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tag = self.tag();
        match self {
            FrontendEvent::DivinationRequested(e) => tagged(tag, e).serialize(serializer),
            FrontendEvent::ProcessStarted(e) => tagged(tag, e).serialize(serializer),
            FrontendEvent::ProcessEnded(e) => tagged(tag, e).serialize(serializer),
            FrontendEvent::DivinationGeneration(e) => tagged(tag, e).serialize(serializer),
            FrontendEvent::IncorrectBlikCode(e) => tagged(tag, e).serialize(serializer),
            FrontendEvent::PaymentCompleted(e) => tagged(tag, e).serialize(serializer),
            FrontendEvent::BusinessError(e) | FrontendEvent::TechnicalError(e) => {
                tagged(tag, e).serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for FrontendEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        crate::validation::parse_event(&value).map_err(serde::de::Error::custom)
    }
}
