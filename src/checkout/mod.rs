//! Hosted checkout links. The coordinator talks to the provider only through
//! [`CheckoutProvider`]; [`payos::PayOsClient`] is the production adapter.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ServiceError;

pub mod order_code;
pub mod payos;

pub use order_code::OrderCodeGenerator;
pub use payos::{PayOsClient, PayOsConfig};

/// Everything the provider needs to open a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLinkRequest {
    pub order_code: i64,
    pub amount: Decimal,
    pub description: String,
    pub cancel_url: String,
    pub return_url: String,
}

/// A link the provider issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLink {
    pub link_id: String,
    pub checkout_url: String,
}

/// The state the provider reports after a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelOutcome {
    /// This call cancelled the link.
    Cancelled,
    /// The link was already cancelled or expired.
    AlreadyCancelled,
    /// The customer paid before the cancel arrived.
    AlreadyPaid,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("checkout provider timed out")]
    Timeout,

    #[error("checkout provider transport error: {0}")]
    Transport(String),

    #[error("checkout provider rejected request: {code} {desc}")]
    Rejected { code: String, desc: String },

    #[error("invalid checkout request: {0}")]
    InvalidRequest(String),

    #[error("invalid checkout provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for CheckoutError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CheckoutError::Timeout
        } else if err.is_decode() {
            CheckoutError::InvalidResponse(err.to_string())
        } else {
            CheckoutError::Transport(err.to_string())
        }
    }
}

impl From<CheckoutError> for ServiceError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Timeout | CheckoutError::Transport(_) => {
                ServiceError::ServiceUnavailable(err.to_string())
            }
            CheckoutError::Rejected { .. } | CheckoutError::InvalidResponse(_) => {
                ServiceError::ExternalServiceError(err.to_string())
            }
            CheckoutError::InvalidRequest(msg) => ServiceError::InvalidInput(msg),
        }
    }
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_link(&self, request: &CheckoutLinkRequest) -> Result<CheckoutLink, CheckoutError>;

    async fn cancel_link(&self, order_code: i64, reason: &str) -> Result<CancelOutcome, CheckoutError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn provider_errors_map_to_retryable_or_not() {
        assert_matches!(
            ServiceError::from(CheckoutError::Timeout),
            ServiceError::ServiceUnavailable(_)
        );
        assert_matches!(
            ServiceError::from(CheckoutError::Transport("reset".into())),
            ServiceError::ServiceUnavailable(_)
        );
        assert_matches!(
            ServiceError::from(CheckoutError::Rejected {
                code: "20".into(),
                desc: "bad".into()
            }),
            ServiceError::ExternalServiceError(_)
        );
        assert_matches!(
            ServiceError::from(CheckoutError::InvalidRequest("amount".into())),
            ServiceError::InvalidInput(_)
        );
    }
}
