//! Cashfree provider adapter.
//!
//! Cashfree reports order amounts as decimal major units; the adapter
//! converts to minor units here, once, before anything else sees the data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::time::Duration;

use crate::config::CashfreeConfig;
use crate::error::EngineError;
use crate::models::{RemoteTransaction, MINOR_UNITS_PER_MAJOR};
use crate::services::provider::{PaymentProvider, TransactionFilter};
use crate::services::signature::SignatureService;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct CashfreeProvider {
    client: Client,
    config: CashfreeConfig,
    signatures: SignatureService,
}

#[derive(Debug, Deserialize)]
struct CashfreePayment {
    cf_payment_id: String,
    /// Decimal major units (rupees).
    payment_amount: Decimal,
    payment_currency: String,
    payment_status: String,
    #[serde(default)]
    payment_tags: serde_json::Value,
    payment_time: DateTime<Utc>,
}

impl CashfreeProvider {
    pub fn new(config: CashfreeConfig, signatures: SignatureService) -> Self {
        Self {
            client: Client::new(),
            config,
            signatures,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.client_secret.expose_secret().is_empty()
    }

    fn normalize_status(status: &str) -> String {
        match status {
            "SUCCESS" => "success".to_string(),
            "FAILED" => "failed".to_string(),
            other => other.to_ascii_lowercase(),
        }
    }

    fn provider_status(status: &str) -> String {
        status.to_ascii_uppercase()
    }

    fn normalize(payment: CashfreePayment) -> Result<RemoteTransaction, EngineError> {
        let amount_minor = (payment.payment_amount * Decimal::from(MINOR_UNITS_PER_MAJOR))
            .round()
            .to_i64()
            .ok_or_else(|| {
                EngineError::Provider(anyhow::anyhow!(
                    "Cashfree amount out of range: {}",
                    payment.payment_amount
                ))
            })?;

        Ok(RemoteTransaction {
            id: payment.cf_payment_id,
            amount_minor,
            currency: payment.payment_currency,
            status: Self::normalize_status(&payment.payment_status),
            notes: payment.payment_tags,
            created_at: payment.payment_time,
        })
    }
}

#[async_trait]
impl PaymentProvider for CashfreeProvider {
    fn name(&self) -> &'static str {
        "cashfree"
    }

    async fn fetch_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<RemoteTransaction>, EngineError> {
        if !self.is_configured() {
            return Err(EngineError::Provider(anyhow::anyhow!(
                "Cashfree credentials not configured"
            )));
        }

        let url = format!("{}/payments", self.config.api_base_url);
        let mut request = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .header("x-client-id", &self.config.client_id)
            .header("x-client-secret", self.config.client_secret.expose_secret());

        if let Some(since) = filter.since {
            request = request.query(&[("start_time", since.to_rfc3339())]);
        }
        if let Some(status) = &filter.status {
            request = request.query(&[("payment_status", Self::provider_status(status))]);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Cashfree API error");
            return Err(EngineError::Provider(anyhow::anyhow!(
                "Cashfree error: {} - {}",
                status,
                body
            )));
        }

        let payments: Vec<CashfreePayment> = serde_json::from_str(&body)
            .map_err(|e| EngineError::Provider(anyhow::Error::new(e)))?;

        let transactions = payments
            .into_iter()
            .map(Self::normalize)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = transactions.len(), "Fetched Cashfree payments");
        Ok(transactions)
    }

    async fn fetch_transaction(
        &self,
        id: &str,
    ) -> Result<Option<RemoteTransaction>, EngineError> {
        if !self.is_configured() {
            return Err(EngineError::Provider(anyhow::anyhow!(
                "Cashfree credentials not configured"
            )));
        }

        let url = format!("{}/payments/{}", self.config.api_base_url, id);
        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .header("x-client-id", &self.config.client_id)
            .header("x-client-secret", self.config.client_secret.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Cashfree API error");
            return Err(EngineError::Provider(anyhow::anyhow!(
                "Cashfree error: {} - {}",
                status,
                body
            )));
        }

        let payment: CashfreePayment = serde_json::from_str(&body)
            .map_err(|e| EngineError::Provider(anyhow::Error::new(e)))?;
        Ok(Some(Self::normalize(payment)?))
    }

    fn verify_signature(&self, payload: &str, signature: &str, timestamp: Option<&str>) -> bool {
        let Some(timestamp) = timestamp else {
            return false;
        };
        self.signatures.verify_cashfree(
            payload,
            signature,
            self.config.webhook_secret.expose_secret(),
            timestamp,
        )
    }
}
