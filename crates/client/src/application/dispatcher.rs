//! Event handler registry and dispatch.
//!
//! The registry maps each [`EventTag`] to at most one handler and keeps a
//! single fallback for everything else. `process` validates a raw value,
//! routes it and reports the outcome; it never panics, even when a handler
//! does.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;

use arcana_protocol::{parse_event, EventParseError, EventTag};

use super::handlers::{EventHandler, EventHandlers, HandlerFuture, UnknownEventHandler};

/// Why an event was not handled successfully.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Invalid(#[from] EventParseError),

    #[error("no handler registered for event type: {0}")]
    Unhandled(EventTag),

    #[error("dispatch failed: {reason}")]
    DispatchFailed { event_type: EventTag, reason: String },
}

impl ProcessError {
    /// Tag of the event, when it got far enough to have one.
    pub fn event_type(&self) -> Option<EventTag> {
        match self {
            ProcessError::Invalid(_) => None,
            ProcessError::Unhandled(tag) => Some(*tag),
            ProcessError::DispatchFailed { event_type, .. } => Some(*event_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unsupported event type: {0}")]
    UnsupportedEventType(String),
}

/// Completion half of [`EventHandlerRegistry::dispatch`].
pub type PendingDispatch = BoxFuture<'static, Result<(), ProcessError>>;

pub type ProcessingErrorObserver = Arc<dyn Fn(&ProcessError, &Value) + Send + Sync>;

/// Dispatch switches.
#[derive(Clone)]
pub struct DispatchOptions {
    /// Log every validated event at info level.
    pub log_events: bool,
    /// Log processing failures at warn level.
    pub log_errors: bool,
    /// Called with every processing failure and the raw value that caused it.
    pub on_processing_error: Option<ProcessingErrorObserver>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            log_events: false,
            log_errors: true,
            on_processing_error: None,
        }
    }
}

impl std::fmt::Debug for DispatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchOptions")
            .field("log_events", &self.log_events)
            .field("log_errors", &self.log_errors)
            .field("on_processing_error", &self.on_processing_error.is_some())
            .finish()
    }
}

/// Tag to handler routing table plus the fallback handler.
///
/// Shared between the transport (which feeds it) and the caller (which
/// registers handlers), so every method takes `&self`.
#[derive(Default)]
pub struct EventHandlerRegistry {
    handlers: RwLock<HashMap<EventTag, EventHandler>>,
    unknown: RwLock<Option<UnknownEventHandler>>,
    options: DispatchOptions,
}

impl EventHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DispatchOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Register `handler` for `tag`, replacing any previous one.
    pub fn register(&self, tag: EventTag, handler: EventHandler) {
        let mut handlers = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        if handlers.insert(tag, handler).is_some() {
            tracing::debug!(event_type = %tag, "Replaced event handler");
        }
    }

    /// Register by wire tag. Tags outside the known set are rejected.
    pub fn register_str(&self, tag: &str, handler: EventHandler) -> Result<(), RegistryError> {
        let tag: EventTag = tag
            .parse()
            .map_err(|_| RegistryError::UnsupportedEventType(tag.to_string()))?;
        self.register(tag, handler);
        Ok(())
    }

    pub fn register_unknown_handler(&self, handler: UnknownEventHandler) {
        *self.unknown.write().unwrap_or_else(|p| p.into_inner()) = Some(handler);
    }

    /// Remove every handler, including the fallback.
    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
        *self.unknown.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    /// Replace the whole registration with `set`.
    pub fn install(&self, set: &EventHandlers) {
        let mut handlers = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        let mut unknown = self.unknown.write().unwrap_or_else(|p| p.into_inner());
        handlers.clear();
        handlers.extend(set.handlers().map(|(tag, handler)| (tag, Arc::clone(handler))));
        *unknown = set.unknown().cloned();
        tracing::debug!(
            handlers = handlers.len(),
            fallback = unknown.is_some(),
            "Installed event handlers"
        );
    }

    pub fn has_handler(&self, tag: EventTag) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&tag)
    }

    /// Registered tags in declaration order.
    pub fn registered_tags(&self) -> Vec<EventTag> {
        let handlers = self.handlers.read().unwrap_or_else(|p| p.into_inner());
        let mut tags: Vec<_> = handlers.keys().copied().collect();
        tags.sort();
        tags
    }

    /// Validate `raw` and route it.
    ///
    /// `Ok(())` only when a registered handler ran to completion without
    /// error. Invalid and unhandled events go to the fallback, whose own
    /// failures are logged and swallowed.
    pub async fn process(&self, raw: Value) -> Result<(), ProcessError> {
        self.dispatch(raw).await
    }

    /// Validate `raw`, route it and invoke its handler before returning.
    ///
    /// The returned future only drives the handler to completion and reports
    /// the outcome. Values dispatched one after another reach their handlers
    /// in that order however the futures are later scheduled.
    pub fn dispatch(&self, raw: Value) -> PendingDispatch {
        let event = match parse_event(&raw) {
            Ok(event) => event,
            Err(err) => return self.reject(ProcessError::Invalid(err), raw),
        };

        let tag = event.tag();
        if self.options.log_events {
            tracing::info!(event_type = %tag, "Received event");
        }

        let Some(handler) = self.handler_for(tag) else {
            return self.reject(ProcessError::Unhandled(tag), raw);
        };

        let pending = invoke(|| handler(event));
        let options = self.options.clone();
        async move {
            let reason = match settle(pending).await {
                Ok(()) => return Ok(()),
                Err(reason) => reason,
            };
            let err = ProcessError::DispatchFailed {
                event_type: tag,
                reason,
            };
            report(&options, &err, &raw);
            Err(err)
        }
        .boxed()
    }

    /// Parse `text` as JSON, then [`process`](Self::process) it.
    ///
    /// Text that is not JSON at all is reported without reaching the
    /// fallback, since there is no value to hand it.
    pub async fn process_json(&self, text: &str) -> Result<(), ProcessError> {
        let raw: Value = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(err) => {
                let err = ProcessError::Invalid(EventParseError::MalformedJson(err));
                if self.options.log_errors {
                    tracing::warn!(error = %err, "Dropping non-JSON event");
                }
                return Err(err);
            }
        };
        self.process(raw).await
    }

    fn handler_for(&self, tag: EventTag) -> Option<EventHandler> {
        self.handlers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&tag)
            .cloned()
    }

    /// Report `err` and hand `raw` to the fallback, if any.
    fn reject(&self, err: ProcessError, raw: Value) -> PendingDispatch {
        report(&self.options, &err, &raw);
        let fallback = self
            .unknown
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        let pending = fallback.map(|fallback| invoke(|| fallback(raw)));

        async move {
            if let Some(pending) = pending {
                if let Err(reason) = settle(pending).await {
                    tracing::error!(error = %reason, "Unknown event handler failed");
                }
            }
            Err(err)
        }
        .boxed()
    }
}

fn report(options: &DispatchOptions, err: &ProcessError, raw: &Value) {
    if options.log_errors {
        match err {
            ProcessError::Invalid(parse) => tracing::warn!(
                error = %parse,
                kind = parse.kind(),
                "Received invalid event"
            ),
            ProcessError::Unhandled(tag) => {
                tracing::warn!(event_type = %tag, "No handler registered for event")
            }
            ProcessError::DispatchFailed { event_type, reason } => tracing::error!(
                event_type = %event_type,
                error = %reason,
                "Event handler failed"
            ),
        }
    }
    if let Some(observer) = &options.on_processing_error {
        observer(err, raw);
    }
}

/// Call a handler, containing a panic raised before it returns its future.
fn invoke(call: impl FnOnce() -> HandlerFuture) -> Result<HandlerFuture, String> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| panicked(payload.as_ref()))
}

async fn settle(pending: Result<HandlerFuture, String>) -> Result<(), String> {
    match AssertUnwindSafe(pending?).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(panicked(payload.as_ref())),
    }
}

fn panicked(payload: &(dyn Any + Send)) -> String {
    let reason = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    format!("handler panicked: {reason}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::{event_handler, unknown_handler};
    use arcana_protocol::FrontendEvent;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> EventHandler {
        let counter = Arc::clone(counter);
        event_handler(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn recording_fallback(seen: &Arc<Mutex<Vec<Value>>>) -> UnknownEventHandler {
        let seen = Arc::clone(seen);
        unknown_handler(move |raw| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().expect("lock").push(raw);
                Ok(())
            }
        })
    }

    fn payment_completed() -> Value {
        json!({
            "type": {"type": "payment.completed"},
            "state": "PAYMENT_SUCCEEDED",
            "message": "ok"
        })
    }

    #[tokio::test]
    async fn registered_handler_receives_valid_event() {
        let registry = EventHandlerRegistry::new();
        let received = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&received);
        registry.register(
            EventTag::PaymentCompleted,
            event_handler(move |event| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock().expect("lock") = Some(event);
                    Ok(())
                }
            }),
        );

        registry
            .process(payment_completed())
            .await
            .expect("processed");

        let event = received.lock().expect("lock").take().expect("event");
        assert_eq!(event.tag(), EventTag::PaymentCompleted);
    }

    #[tokio::test]
    async fn unknown_tag_goes_to_fallback_only() {
        let registry = EventHandlerRegistry::new();
        let tag_calls = Arc::new(AtomicUsize::new(0));
        let fallback_seen = Arc::new(Mutex::new(Vec::new()));
        for tag in EventTag::ALL {
            registry.register(tag, counting_handler(&tag_calls));
        }
        registry.register_unknown_handler(recording_fallback(&fallback_seen));

        let raw = json!({"type": {"type": "x.y"}});
        let err = registry.process(raw.clone()).await.expect_err("rejected");

        assert!(matches!(
            err,
            ProcessError::Invalid(EventParseError::UnknownEventType(ref tag)) if tag == "x.y"
        ));
        assert_eq!(tag_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*fallback_seen.lock().expect("lock"), vec![raw]);
    }

    #[tokio::test]
    async fn invalid_known_event_goes_to_fallback_once() {
        let registry = EventHandlerRegistry::new();
        let tag_calls = Arc::new(AtomicUsize::new(0));
        let fallback_seen = Arc::new(Mutex::new(Vec::new()));
        registry.register(EventTag::DivinationGeneration, counting_handler(&tag_calls));
        registry.register_unknown_handler(recording_fallback(&fallback_seen));

        let raw = json!({
            "type": {"type": "divination.generation"},
            "divination": "text",
            "status": "MAYBE"
        });
        let err = registry.process(raw).await.expect_err("rejected");

        assert_eq!(
            err.to_string(),
            "event validation failed for type: divination.generation"
        );
        assert_eq!(tag_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fallback_seen.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn unhandled_known_tag_goes_to_fallback_and_fails() {
        let registry = EventHandlerRegistry::new();
        let fallback_seen = Arc::new(Mutex::new(Vec::new()));
        registry.register_unknown_handler(recording_fallback(&fallback_seen));

        let err = registry
            .process(payment_completed())
            .await
            .expect_err("unhandled");

        assert!(matches!(err, ProcessError::Unhandled(EventTag::PaymentCompleted)));
        assert_eq!(*fallback_seen.lock().expect("lock"), vec![payment_completed()]);
    }

    #[tokio::test]
    async fn no_fallback_still_reports_failure() {
        let registry = EventHandlerRegistry::new();

        let err = registry
            .process(json!({"hello": "world"}))
            .await
            .expect_err("rejected");

        assert_eq!(
            err.to_string(),
            "event does not have required type structure"
        );
    }

    #[tokio::test]
    async fn re_registration_replaces_previous_handler() {
        let registry = EventHandlerRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        registry.register(EventTag::PaymentCompleted, counting_handler(&first));
        registry.register(EventTag::PaymentCompleted, counting_handler(&second));

        registry
            .process(payment_completed())
            .await
            .expect("processed");

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_error_becomes_dispatch_failure() {
        let registry = EventHandlerRegistry::new();
        let fallback_seen = Arc::new(Mutex::new(Vec::new()));
        registry.register_unknown_handler(recording_fallback(&fallback_seen));
        registry.register(
            EventTag::PaymentCompleted,
            event_handler(|_| async { Err(anyhow::anyhow!("store offline")) }),
        );

        let err = registry
            .process(payment_completed())
            .await
            .expect_err("failed");

        assert_eq!(err.to_string(), "dispatch failed: store offline");
        assert_eq!(err.event_type(), Some(EventTag::PaymentCompleted));
        assert!(fallback_seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let registry = EventHandlerRegistry::new();
        registry.register(
            EventTag::PaymentCompleted,
            event_handler(|_| async { panic!("handler exploded") }),
        );

        let err = registry
            .process(payment_completed())
            .await
            .expect_err("failed");

        assert_eq!(
            err.to_string(),
            "dispatch failed: handler panicked: handler exploded"
        );
    }

    #[tokio::test]
    async fn dispatch_invokes_handlers_in_call_order() {
        let registry = EventHandlerRegistry::new();
        let invoked = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&invoked);
        let handler: EventHandler = Arc::new(move |event: FrontendEvent| -> HandlerFuture {
            if let FrontendEvent::PaymentCompleted(payload) = event {
                sink.lock().expect("lock").push(payload.message);
            }
            futures_util::future::ready(Ok(())).boxed()
        });
        registry.register(EventTag::PaymentCompleted, handler);

        let pending: Vec<_> = (0..5)
            .map(|i| {
                registry.dispatch(json!({
                    "type": {"type": "payment.completed"},
                    "state": "PAYMENT_SUCCEEDED",
                    "message": i.to_string()
                }))
            })
            .collect();

        // Invoked before anything is awaited.
        assert_eq!(*invoked.lock().expect("lock"), vec!["0", "1", "2", "3", "4"]);
        for result in futures_util::future::join_all(pending.into_iter().rev()).await {
            result.expect("processed");
        }
    }

    #[tokio::test]
    async fn panic_before_the_future_is_built_is_contained() {
        let registry = EventHandlerRegistry::new();
        let handler: EventHandler =
            Arc::new(|_: FrontendEvent| -> HandlerFuture { panic!("no future for you") });
        registry.register(EventTag::PaymentCompleted, handler);

        let err = registry
            .process(payment_completed())
            .await
            .expect_err("failed");

        assert_eq!(
            err.to_string(),
            "dispatch failed: handler panicked: no future for you"
        );
    }

    #[tokio::test]
    async fn fallback_failure_is_swallowed() {
        let registry = EventHandlerRegistry::new();
        registry.register_unknown_handler(unknown_handler(|_| async {
            Err(anyhow::anyhow!("fallback broke"))
        }));

        let err = registry
            .process(json!({"type": {"type": "x.y"}}))
            .await
            .expect_err("rejected");

        assert!(matches!(err, ProcessError::Invalid(_)));
    }

    #[tokio::test]
    async fn clear_removes_handlers_and_fallback() {
        let registry = EventHandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fallback_seen = Arc::new(Mutex::new(Vec::new()));
        registry.register(EventTag::PaymentCompleted, counting_handler(&calls));
        registry.register_unknown_handler(recording_fallback(&fallback_seen));

        registry.clear();

        assert!(!registry.has_handler(EventTag::PaymentCompleted));
        assert!(registry.registered_tags().is_empty());
        let err = registry
            .process(payment_completed())
            .await
            .expect_err("unhandled");
        assert!(matches!(err, ProcessError::Unhandled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(fallback_seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn register_str_rejects_unknown_tags() {
        let registry = EventHandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        registry
            .register_str("error.business", counting_handler(&calls))
            .expect("known tag");
        let err = registry
            .register_str("error.unknown", counting_handler(&calls))
            .expect_err("unknown tag");

        assert_eq!(
            err,
            RegistryError::UnsupportedEventType("error.unknown".to_string())
        );
        assert_eq!(registry.registered_tags(), vec![EventTag::BusinessError]);
    }

    #[tokio::test]
    async fn install_replaces_previous_registration() {
        let registry = EventHandlerRegistry::new();
        let stale = Arc::new(AtomicUsize::new(0));
        registry.register(EventTag::TechnicalError, counting_handler(&stale));

        let completed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completed);
        registry.install(&EventHandlers::new().on_payment_completed(move |event| {
            let counter = Arc::clone(&counter);
            async move {
                assert_eq!(event.message, "ok");
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        assert_eq!(registry.registered_tags(), vec![EventTag::PaymentCompleted]);
        registry
            .process(payment_completed())
            .await
            .expect("processed");
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(stale.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn process_json_skips_fallback_for_malformed_text() {
        let registry = EventHandlerRegistry::new();
        let fallback_seen = Arc::new(Mutex::new(Vec::new()));
        registry.register_unknown_handler(recording_fallback(&fallback_seen));

        let err = registry.process_json("{not json").await.expect_err("rejected");

        assert!(err.to_string().starts_with("JSON parsing failed:"));
        assert!(fallback_seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn observer_sees_every_failure() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let registry = EventHandlerRegistry::with_options(DispatchOptions {
            log_events: true,
            log_errors: false,
            on_processing_error: Some(Arc::new(move |err: &ProcessError, raw: &Value| {
                sink.lock()
                    .expect("lock")
                    .push((err.to_string(), raw.clone()));
            })),
        });

        let _ = registry.process(json!({"type": 3})).await;
        let _ = registry.process(payment_completed()).await;

        let failures = failures.lock().expect("lock");
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, "event does not have required type structure");
        assert_eq!(failures[0].1, json!({"type": 3}));
        assert_eq!(
            failures[1].0,
            "no handler registered for event type: payment.completed"
        );
    }
}
