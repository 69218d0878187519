//! Payment provider boundary.
//!
//! One implementation per provider, selected by a factory keyed on provider
//! name. Each adapter normalizes amounts to minor units before handing
//! transactions to the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::error::EngineError;
use crate::models::RemoteTransaction;
use crate::services::cashfree::CashfreeProvider;
use crate::services::razorpay::RazorpayProvider;
use crate::services::signature::SignatureService;

/// Filter for provider transaction history pulls.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Normalized status ("success", "failed"); adapters translate to the
    /// provider's vocabulary.
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pull transaction history matching the filter.
    async fn fetch_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<RemoteTransaction>, EngineError>;

    /// Fetch one transaction by provider id. `None` when the provider does
    /// not know the id.
    async fn fetch_transaction(
        &self,
        id: &str,
    ) -> Result<Option<RemoteTransaction>, EngineError>;

    /// Authenticate an inbound webhook body. `timestamp` carries the
    /// provider's signature timestamp header where one exists.
    fn verify_signature(&self, payload: &str, signature: &str, timestamp: Option<&str>) -> bool;
}

/// Build the adapter for a provider name.
pub fn create_provider(
    name: &str,
    config: &Config,
) -> Result<Arc<dyn PaymentProvider>, EngineError> {
    let signatures = SignatureService::new(config.signature.clone());
    match name {
        "razorpay" => Ok(Arc::new(RazorpayProvider::new(
            config.razorpay.clone(),
            signatures,
        ))),
        "cashfree" => Ok(Arc::new(CashfreeProvider::new(
            config.cashfree.clone(),
            signatures,
        ))),
        other => Err(EngineError::Validation(format!(
            "Unknown payment provider: {}",
            other
        ))),
    }
}
