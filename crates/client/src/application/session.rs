//! Payment session: the headless consumer of a process's events.
//!
//! Tracks where one divination process stands from the payer's point of
//! view. Once the reading arrives the session stops listening, so late or
//! duplicated events cannot overwrite the outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future;
use tokio::sync::watch;

use arcana_protocol::{
    DivinationGenerationEvent, DivinationRequestedEvent, GenerationStatus,
    IncorrectBlikCodeEvent, MessageEvent, PaymentCompletedEvent, PaymentState,
    ProcessEndedEvent, ProcessStartedEvent, ProcessStatus, TarotCard,
};

use super::handlers::EventHandlers;

/// One-way switch: once closed, events are ignored.
#[derive(Debug, Clone, Default)]
pub struct EventLatch(Arc<AtomicBool>);

impl EventLatch {
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Waiting for the payment outcome
    AwaitingPayment,
    /// Payment went through, waiting for the reading
    AwaitingReading,
    /// Payment declined; a new code may be submitted
    PaymentRejected { message: String },
    BusinessError { message: String },
    TechnicalError { message: String },
    Completed {
        reading: String,
        status: GenerationStatus,
    },
}

impl SessionStatus {
    /// Nothing more will happen for this process.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::BusinessError { .. }
                | SessionStatus::TechnicalError { .. }
                | SessionStatus::Completed { .. }
        )
    }

    /// The payer has to act or the process is over.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || matches!(self, SessionStatus::PaymentRejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub cards: Vec<TarotCard>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::AwaitingPayment,
            cards: Vec::new(),
        }
    }
}

fn or_default(message: String, fallback: &str) -> String {
    if message.is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

/// Session state for one process, cheap to clone.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    latch: EventLatch,
}

impl Default for PaymentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentSession {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self {
            snapshot: Arc::new(snapshot),
            latch: EventLatch::default(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn latch(&self) -> &EventLatch {
        &self.latch
    }

    /// Wait until the session is settled (see [`SessionStatus::is_settled`]).
    pub async fn settled(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        let snapshot = match rx.wait_for(|snapshot| snapshot.status.is_settled()).await {
            Ok(snapshot) => snapshot.clone(),
            // Unreachable while `self` holds the sender.
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    /// Handler set feeding this session.
    pub fn handlers(&self) -> EventHandlers {
        EventHandlers::new()
            .on_process_started(self.apply(Self::process_started))
            .on_payment_completed(self.apply(Self::payment_completed))
            .on_incorrect_blik_code(self.apply(Self::incorrect_blik_code))
            .on_divination_requested(self.apply(Self::divination_requested))
            .on_divination_generation(self.apply(Self::divination_generation))
            .on_business_error(self.apply(Self::business_error))
            .on_technical_error(self.apply(Self::technical_error))
            .on_process_ended(self.apply(Self::process_ended))
            .on_unknown(|raw| {
                tracing::warn!(event = %raw, "Unknown event");
                future::ready(Ok(()))
            })
    }

    fn apply<T>(
        &self,
        transition: fn(&Self, T),
    ) -> impl Fn(T) -> future::Ready<anyhow::Result<()>> + Send + Sync + 'static
    where
        T: 'static,
    {
        let session = self.clone();
        move |event| {
            if session.latch.is_closed() {
                tracing::debug!("Session finished, ignoring event");
            } else {
                transition(&session, event);
            }
            future::ready(Ok(()))
        }
    }

    fn set_status(&self, status: SessionStatus) {
        tracing::info!(status = ?status, "Payment session updated");
        self.snapshot.send_modify(|snapshot| snapshot.status = status);
    }

    pub fn process_started(&self, event: ProcessStartedEvent) {
        tracing::info!(process_id = %event.process_id, "Process started");
    }

    pub fn payment_completed(&self, event: PaymentCompletedEvent) {
        let PaymentCompletedEvent { state, message } = event;
        match state {
            PaymentState::PaymentSucceeded => {
                tracing::info!("Payment succeeded");
                self.set_status(SessionStatus::AwaitingReading);
            }
            PaymentState::PaymentFailedBusinessError => {
                self.set_status(SessionStatus::BusinessError {
                    message: or_default(message, "PAYMENT: A business error occurred."),
                });
            }
            PaymentState::PaymentFailedTechnicalError => {
                self.set_status(SessionStatus::TechnicalError {
                    message: or_default(message, "PAYMENT: A technical error occurred."),
                });
            }
            PaymentState::Pending => {
                self.set_status(SessionStatus::PaymentRejected {
                    message: or_default(message, "PAYMENT: Payment failed. Please try again."),
                });
            }
        }
    }

    pub fn incorrect_blik_code(&self, event: IncorrectBlikCodeEvent) {
        self.set_status(SessionStatus::PaymentRejected {
            message: or_default(event.message, "Incorrect BLIK code."),
        });
    }

    pub fn divination_requested(&self, event: DivinationRequestedEvent) {
        tracing::info!(cards = event.cards.len(), "Cards drawn");
        self.snapshot
            .send_modify(|snapshot| snapshot.cards = event.cards);
    }

    /// Stores the reading and closes the latch.
    pub fn divination_generation(&self, event: DivinationGenerationEvent) {
        self.latch.close();
        self.set_status(SessionStatus::Completed {
            reading: event.divination,
            status: event.status,
        });
    }

    pub fn business_error(&self, event: MessageEvent) {
        self.set_status(SessionStatus::BusinessError {
            message: or_default(event.message, "A business error occurred."),
        });
    }

    pub fn technical_error(&self, event: MessageEvent) {
        self.set_status(SessionStatus::TechnicalError {
            message: or_default(event.message, "A technical error occurred."),
        });
    }

    pub fn process_ended(&self, event: ProcessEndedEvent) {
        let status = if event.status == ProcessStatus::FinishedWithWrongPaymentStatus {
            SessionStatus::BusinessError {
                message: or_default(event.message, "The payment status was invalid."),
            }
        } else {
            SessionStatus::TechnicalError {
                message: or_default(event.message, "The connection was closed."),
            }
        };
        self.set_status(status);
    }
}
