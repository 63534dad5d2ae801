//! Runtime validation of backend events.
//!
//! Validation runs in two steps. The shape check confirms the value is an
//! object whose `type` field is an object holding a string `type`. The
//! extracted tag then selects one validator from a fixed table; that validator
//! must accept every required field or the whole event is rejected.

use serde::de::{DeserializeOwned, Error as _};
use serde_json::Value;
use thiserror::Error;

use crate::events::{
    DivinationGenerationEvent, DivinationRequestedEvent, EventTag, FrontendEvent,
    IncorrectBlikCodeEvent, MessageEvent, PaymentCompletedEvent, ProcessEndedEvent,
    ProcessStartedEvent,
};

/// Why a raw value could not be narrowed to a [`FrontendEvent`].
#[derive(Debug, Error)]
pub enum EventParseError {
    /// The value lacks the `type.type` string path.
    #[error("event does not have required type structure")]
    MissingTypeStructure,

    /// The discriminant is not one of the known tags.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The discriminant is known but a required field is missing or mistyped.
    #[error("event validation failed for type: {event_type}")]
    ValidationFailed {
        event_type: EventTag,
        #[source]
        source: serde_json::Error,
    },

    /// Raw text was not JSON at all.
    #[error("JSON parsing failed: {0}")]
    MalformedJson(#[source] serde_json::Error),
}

impl EventParseError {
    /// Stable machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            EventParseError::MissingTypeStructure => "missing_type_structure",
            EventParseError::UnknownEventType(_) => "unknown_event_type",
            EventParseError::ValidationFailed { .. } => "validation_error",
            EventParseError::MalformedJson(_) => "malformed_json",
        }
    }
}

// =============================================================================
// Validator table
// =============================================================================

type Validator = fn(&Value) -> Result<FrontendEvent, serde_json::Error>;

/// One validator per known tag.
const VALIDATORS: [(EventTag, Validator); 8] = [
    (EventTag::DivinationRequested, validate_divination_requested),
    (EventTag::ProcessStarted, validate_process_started),
    (EventTag::ProcessEnded, validate_process_ended),
    (EventTag::DivinationGeneration, validate_divination_generation),
    (EventTag::IncorrectBlikCode, validate_incorrect_blik_code),
    (EventTag::PaymentCompleted, validate_payment_completed),
    (EventTag::BusinessError, validate_business_error),
    (EventTag::TechnicalError, validate_technical_error),
];

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(value)
}

/// Enum fields must be plain strings. Serde would also accept the
/// externally tagged `{"VARIANT": null}` form for a unit variant.
fn require_string(value: &Value, field: &str) -> Result<(), serde_json::Error> {
    match value.get(field) {
        Some(v) if !v.is_string() => Err(serde_json::Error::custom(format!(
            "`{field}` must be a string"
        ))),
        _ => Ok(()),
    }
}

fn validate_divination_requested(value: &Value) -> Result<FrontendEvent, serde_json::Error> {
    // Serde would also accept a card written as a positional array.
    let cards_are_objects = value
        .get("cards")
        .and_then(Value::as_array)
        .is_some_and(|cards| cards.iter().all(Value::is_object));
    if !cards_are_objects {
        return Err(serde_json::Error::custom(
            "`cards` must be an array of card objects",
        ));
    }
    decode::<DivinationRequestedEvent>(value).map(FrontendEvent::DivinationRequested)
}

fn validate_process_started(value: &Value) -> Result<FrontendEvent, serde_json::Error> {
    decode::<ProcessStartedEvent>(value).map(FrontendEvent::ProcessStarted)
}

fn validate_process_ended(value: &Value) -> Result<FrontendEvent, serde_json::Error> {
    require_string(value, "status")?;
    decode::<ProcessEndedEvent>(value).map(FrontendEvent::ProcessEnded)
}

fn validate_divination_generation(value: &Value) -> Result<FrontendEvent, serde_json::Error> {
    require_string(value, "status")?;
    decode::<DivinationGenerationEvent>(value).map(FrontendEvent::DivinationGeneration)
}

fn validate_incorrect_blik_code(value: &Value) -> Result<FrontendEvent, serde_json::Error> {
    decode::<IncorrectBlikCodeEvent>(value).map(FrontendEvent::IncorrectBlikCode)
}

fn validate_payment_completed(value: &Value) -> Result<FrontendEvent, serde_json::Error> {
    require_string(value, "state")?;
    decode::<PaymentCompletedEvent>(value).map(FrontendEvent::PaymentCompleted)
}

fn validate_business_error(value: &Value) -> Result<FrontendEvent, serde_json::Error> {
    decode::<MessageEvent>(value).map(FrontendEvent::BusinessError)
}

fn validate_technical_error(value: &Value) -> Result<FrontendEvent, serde_json::Error> {
    decode::<MessageEvent>(value).map(FrontendEvent::TechnicalError)
}

/// Extract the `type.type` discriminant if the value has the event shape.
fn discriminant(value: &Value) -> Option<&str> {
    value.as_object()?.get("type")?.as_object()?.get("type")?.as_str()
}

// =============================================================================
// Parsing
// =============================================================================

/// Narrow an already-decoded JSON value into a concrete event.
pub fn parse_event(value: &Value) -> Result<FrontendEvent, EventParseError> {
    let Some(event_type) = discriminant(value) else {
        return Err(EventParseError::MissingTypeStructure);
    };

    let Some((tag, validator)) = VALIDATORS
        .iter()
        .find(|(tag, _)| tag.as_str() == event_type)
    else {
        return Err(EventParseError::UnknownEventType(event_type.to_string()));
    };

    validator(value).map_err(|source| {
        tracing::debug!(event_type = %tag, error = %source, "Event failed validation");
        EventParseError::ValidationFailed {
            event_type: *tag,
            source,
        }
    })
}

/// Parse raw JSON text and then validate it. Never panics on bad input.
pub fn parse_event_from_json(json: &str) -> Result<FrontendEvent, EventParseError> {
    let value: Value = serde_json::from_str(json).map_err(EventParseError::MalformedJson)?;
    parse_event(&value)
}

/// Tags that have a registered validator.
pub fn supported_event_types() -> Vec<EventTag> {
    VALIDATORS.iter().map(|(tag, _)| *tag).collect()
}

pub fn is_event_type_supported(event_type: &str) -> bool {
    VALIDATORS.iter().any(|(tag, _)| tag.as_str() == event_type)
}
