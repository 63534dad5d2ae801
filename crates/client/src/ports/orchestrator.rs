//! Orchestrator, payment and management service port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use arcana_protocol::{BlikPaymentRequest, DivinationFormData};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Server responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Body returned when a divination process starts.
///
/// The backend owns this shape; only the process id is interpreted, the
/// rest is kept verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StartedProcess {
    #[serde(rename = "processId", default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Reporting window for the profit summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

/// Profit summary for administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub total_revenue: f64,
    pub token_usage: f64,
    pub profit: f64,
    /// Window the figures cover; `None` for all time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrchestratorPort: Send + Sync {
    /// Start a divination process for `user_id`.
    async fn start_divination_process(
        &self,
        user_id: &str,
        form: &DivinationFormData,
    ) -> Result<StartedProcess, ApiError>;

    /// Submit a BLIK payment for a running process.
    async fn send_blik_payment(&self, request: &BlikPaymentRequest) -> Result<(), ApiError>;

    /// Fetch the profit summary, optionally limited to `range`.
    ///
    /// `password` is the management service's admin password.
    async fn admin_summary(
        &self,
        password: &str,
        range: Option<DateRange>,
    ) -> Result<AdminSummary, ApiError>;
}
