//! Error taxonomy for the payment engine.
//!
//! Only unexpected failures are errors. Expected business conditions
//! (duplicate delivery, amount mismatch, missing order during webhook
//! processing) are structured [`crate::models::PaymentOutcome`] values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input from the caller (invalid plan, malformed UPI parameters).
    /// Never retried automatically.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Order or remote transaction missing for an explicit lookup.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream provider API failure. Transient; a reconciliation run that
    /// hits this aborts without a checkpoint update and is safe to retry.
    #[error("Provider error: {0}")]
    Provider(anyhow::Error),

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl EngineError {
    /// Whether a caller should retry the operation on the next schedule.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Provider(_) | EngineError::Storage(_))
    }
}

impl From<mongodb::error::Error> for EngineError {
    fn from(err: mongodb::error::Error) -> Self {
        EngineError::Storage(anyhow::Error::new(err))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Provider(anyhow::Error::new(err))
    }
}
