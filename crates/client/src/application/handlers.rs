//! Handler types and the typed handler set.
//!
//! Handlers are async: each returns a boxed future resolving to
//! `anyhow::Result<()>`. The registry awaits it before reporting the outcome.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use serde_json::Value;

use arcana_protocol::{
    DivinationGenerationEvent, DivinationRequestedEvent, EventTag, FrontendEvent,
    IncorrectBlikCodeEvent, MessageEvent, PaymentCompletedEvent, ProcessEndedEvent,
    ProcessStartedEvent,
};

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Handler for one validated event.
pub type EventHandler = Arc<dyn Fn(FrontendEvent) -> HandlerFuture + Send + Sync>;

/// Fallback handler. Receives the raw value of invalid or unhandled events.
pub type UnknownEventHandler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`].
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(FrontendEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Wrap an async closure as an [`UnknownEventHandler`].
pub fn unknown_handler<F, Fut>(f: F) -> UnknownEventHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |raw| f(raw).boxed())
}

/// A complete handler set: at most one typed callback per event tag plus the
/// fallback.
///
/// Installing a set into the registry replaces whatever was registered
/// before, so callers rebuild the set and reinstall it whenever their
/// callbacks change.
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: BTreeMap<EventTag, EventHandler>,
    unknown: Option<UnknownEventHandler>,
}

macro_rules! typed_handler {
    ($(#[$doc:meta])* $method:ident => $variant:ident($payload:ty)) => {
        $(#[$doc])*
        pub fn $method<F, Fut>(mut self, f: F) -> Self
        where
            F: Fn($payload) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        {
            let handler: EventHandler = Arc::new(move |event| match event {
                FrontendEvent::$variant(payload) => f(payload).boxed(),
                other => future::ready(Err(anyhow::anyhow!(
                    "{} handler received {}",
                    EventTag::$variant,
                    other.tag()
                )))
                .boxed(),
            });
            self.handlers.insert(EventTag::$variant, handler);
            self
        }
    };
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    typed_handler!(
        /// `divination.requested`
        on_divination_requested => DivinationRequested(DivinationRequestedEvent)
    );
    typed_handler!(
        /// `process.started`
        on_process_started => ProcessStarted(ProcessStartedEvent)
    );
    typed_handler!(
        /// `process.ended`
        on_process_ended => ProcessEnded(ProcessEndedEvent)
    );
    typed_handler!(
        /// `divination.generation`
        on_divination_generation => DivinationGeneration(DivinationGenerationEvent)
    );
    typed_handler!(
        /// `payment.blik.incorrect`
        on_incorrect_blik_code => IncorrectBlikCode(IncorrectBlikCodeEvent)
    );
    typed_handler!(
        /// `payment.completed`
        on_payment_completed => PaymentCompleted(PaymentCompletedEvent)
    );
    typed_handler!(
        /// `error.business`
        on_business_error => BusinessError(MessageEvent)
    );
    typed_handler!(
        /// `error.technical`
        on_technical_error => TechnicalError(MessageEvent)
    );

    /// Callback for invalid events and valid events with no typed callback.
    pub fn on_unknown<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.unknown = Some(unknown_handler(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.unknown.is_none()
    }

    pub fn tags(&self) -> impl Iterator<Item = EventTag> + '_ {
        self.handlers.keys().copied()
    }

    pub(crate) fn handlers(&self) -> impl Iterator<Item = (EventTag, &EventHandler)> + '_ {
        self.handlers.iter().map(|(tag, handler)| (*tag, handler))
    }

    pub(crate) fn unknown(&self) -> Option<&UnknownEventHandler> {
        self.unknown.as_ref()
    }
}
