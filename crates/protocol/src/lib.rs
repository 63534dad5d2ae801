//! Arcana Protocol - Shared types for the client and the orchestration backend
//!
//! This crate contains every type exchanged with the backend:
//! - Backend-pushed events (`FrontendEvent`) and their closed enumerations
//! - Runtime validation that narrows arbitrary JSON into a concrete event
//! - STOMP 1.2 text framing used on top of the WebSocket
//! - Outbound HTTP request bodies
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json, thiserror and tracing
//! 2. **No transport logic** - Pure data types, parsing and serialization
//! 3. **Closed schema** - Unknown discriminants are reported, never coerced

pub mod events;
pub mod requests;
pub mod stomp;
pub mod validation;

// =============================================================================
// Event Types
// =============================================================================
pub use events::{
    DivinationGenerationEvent, DivinationRequestedEvent, EventTag, FrontendEvent,
    GenerationStatus, IncorrectBlikCodeEvent, MessageEvent, PaymentCompletedEvent, PaymentState,
    ProcessEndedEvent, ProcessStartedEvent, ProcessStatus, TarotCard, UnknownEventTag,
};

// =============================================================================
// Validation
// =============================================================================
pub use validation::{
    is_event_type_supported, parse_event, parse_event_from_json, supported_event_types,
    EventParseError,
};

// =============================================================================
// Framing
// =============================================================================
pub use stomp::{FrameError, StompCommand, StompFrame};

// =============================================================================
// Requests
// =============================================================================
pub use requests::{BlikPaymentRequest, DivinationFormData};
