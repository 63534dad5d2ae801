//! Ports to external services.

pub mod orchestrator;

pub use orchestrator::{AdminSummary, ApiError, DateRange, OrchestratorPort, StartedProcess};
