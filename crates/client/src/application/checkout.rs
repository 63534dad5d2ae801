//! BLIK checkout for a running process.

use std::sync::LazyLock;

use regex_lite::Regex;
use thiserror::Error;

use arcana_protocol::BlikPaymentRequest;

use crate::infrastructure::messaging::ProcessKey;
use crate::ports::{ApiError, OrchestratorPort};

static BLIK_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("Please enter a valid 6-digit BLIK code")]
    InvalidBlikCode,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Exactly six ASCII digits.
pub fn is_valid_blik_code(code: &str) -> bool {
    BLIK_CODE.is_match(code)
}

/// Validate `code` and submit it for the process in `key`.
///
/// Malformed codes never reach the payment service.
pub async fn submit_blik_payment(
    port: &dyn OrchestratorPort,
    key: &ProcessKey,
    code: &str,
) -> Result<(), CheckoutError> {
    if !is_valid_blik_code(code) {
        tracing::warn!(process_id = %key.process_id, "Rejected malformed BLIK code");
        return Err(CheckoutError::InvalidBlikCode);
    }

    let request = BlikPaymentRequest {
        user_id: key.user_id.clone(),
        process_id: key.process_id.clone(),
        blik_code: code.to_string(),
    };
    port.send_blik_payment(&request).await?;
    tracing::info!(
        user_id = %key.user_id,
        process_id = %key.process_id,
        "BLIK payment submitted"
    );
    Ok(())
}
